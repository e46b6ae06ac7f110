pub mod health;
pub mod upscale;
