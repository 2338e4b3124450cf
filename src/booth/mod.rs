mod model;


pub use model::{BoothModel, RecoveryResult};
