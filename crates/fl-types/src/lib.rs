pub mod context;
pub mod data;
pub mod errors;
pub mod hyperparameter;
pub mod model;

pub use context::*;
pub use data::*;
pub use errors::*;
pub use hyperparameter::*;
pub use model::*;
