pub mod decode;
pub mod error;
pub mod model;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod queries;
pub mod store;
