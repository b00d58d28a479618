pub mod controller;
pub mod reconciler;
pub mod reconcilers;
pub mod store;

pub use controller::run;
