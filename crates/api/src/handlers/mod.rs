pub mod upscale;
