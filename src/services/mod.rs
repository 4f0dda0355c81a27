pub mod assessment;
pub mod deep_link;
pub mod explanation;
pub mod llm_provider;
pub mod prompts;
pub mod segmentation;
pub mod stroke_data;
pub mod tutor;
pub mod worksheet;
