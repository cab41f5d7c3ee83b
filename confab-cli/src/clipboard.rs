use confab_core::{Clipboard, ClipboardError};

/// The desktop clipboard. Opened per operation so a missing display only
/// fails the copy that needed it.
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| ClipboardError(e.to_string()))?;
        clipboard
            .set_text(text)
            .map_err(|e| ClipboardError(e.to_string()))
    }
}

/// Read an image from the clipboard and encode it as PNG.
pub fn paste_image() -> Option<Vec<u8>> {
    let mut clipboard = arboard::Clipboard::new().ok()?;
    let img_data = clipboard.get_image().ok()?;
    let w = img_data.width as u32;
    let h = img_data.height as u32;
    let rgba = image::RgbaImage::from_raw(w, h, img_data.bytes.into_owned())?;
    let mut png_buf = std::io::Cursor::new(Vec::new());
    rgba.write_to(&mut png_buf, image::ImageFormat::Png).ok()?;
    Some(png_buf.into_inner())
}

/// Read plain text from the clipboard.
pub fn paste_text() -> Option<String> {
    arboard::Clipboard::new().ok()?.get_text().ok()
}
