mod prediction;
mod predictor;
mod user;

pub use prediction::{Inputs, PredictionIter, PredictionOptions, PredictionService};
pub(crate) use prediction::LazyRuntime;
pub use predictor::PredictorService;
pub use user::UserService;
