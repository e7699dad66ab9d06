/// One remote image as returned by the catalog listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoItem {
    pub remote_id: String,
    pub display_name: String,
}

/// RGBA8 pixels sized exactly to the display surface.
#[derive(Debug, Clone)]
pub struct DisplayFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DisplayFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
