mod datafast;
mod hotmart;
mod paypal;

pub use datafast::*;
pub use hotmart::*;
pub use paypal::*;
