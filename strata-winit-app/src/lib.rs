pub mod app;
pub mod window_surface;
