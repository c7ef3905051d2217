pub mod roboflow_collect;

pub use roboflow_collect::{InferenceProvider, ModelId};
#[cfg(feature = "reqwest")]
pub use roboflow_collect::RoboflowCollect;
