pub mod effects;
pub mod expectations;
pub mod scene;

pub use effects::{build_effects_scene, pentagram, EFFECTS_HEIGHT, EFFECTS_WIDTH};
pub use expectations::{src_over, Frame, PixelExpectation};
pub use scene::{build_main_scene, CANVAS_HEIGHT, CANVAS_WIDTH};
