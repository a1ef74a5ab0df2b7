pub mod etl_pipeline;
pub mod shutdown;
