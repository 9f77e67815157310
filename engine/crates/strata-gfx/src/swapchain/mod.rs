pub mod negotiate;
pub mod surface;

pub use negotiate::{choose_extent, choose_image_count, choose_present_mode, choose_surface_format};
