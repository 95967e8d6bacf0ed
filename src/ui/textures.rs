//! Background images, decoded off the UI thread.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use anyhow::{Context, Result};
use eframe::egui;
use tracing::warn;

use crate::model::frame::ImageRef;

enum Entry {
    Loading,
    Ready(egui::TextureHandle),
    Failed,
}

pub struct BackgroundCache {
    entries: HashMap<ImageRef, Entry>,
    base_dir: Option<PathBuf>,
    tx: Sender<(ImageRef, Result<egui::ColorImage>)>,
    rx: Receiver<(ImageRef, Result<egui::ColorImage>)>,
}

impl BackgroundCache {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            entries: HashMap::new(),
            base_dir: None,
            tx,
            rx,
        }
    }

    /// Relative image paths are resolved against this directory.
    pub fn set_base_dir(&mut self, dir: Option<PathBuf>) {
        if self.base_dir != dir {
            self.base_dir = dir;
            self.entries.clear();
        }
    }

    /// Texture for `image` if it is ready; starts loading it otherwise.
    pub fn get(&mut self, ctx: &egui::Context, image: &ImageRef) -> Option<egui::TextureHandle> {
        if image.is_placeholder() {
            return None;
        }

        while let Ok((loaded, result)) = self.rx.try_recv() {
            let entry = match result {
                Ok(pixels) => Entry::Ready(ctx.load_texture(
                    loaded.as_str(),
                    pixels,
                    egui::TextureOptions::LINEAR,
                )),
                Err(error) => {
                    warn!(image = %loaded, error = %format!("{error:#}"), "background failed to load");
                    Entry::Failed
                }
            };
            self.entries.insert(loaded, entry);
        }

        match self.entries.get(image) {
            Some(Entry::Ready(texture)) => Some(texture.clone()),
            Some(Entry::Loading) | Some(Entry::Failed) => None,
            None => {
                self.entries.insert(image.clone(), Entry::Loading);
                let image = image.clone();
                let base = self.base_dir.clone();
                let tx = self.tx.clone();
                let ctx = ctx.clone();
                thread::spawn(move || {
                    let result = read_image_bytes(&image, base.as_deref()).and_then(|b| decode(&b));
                    let _ = tx.send((image, result));
                    ctx.request_repaint();
                });
                None
            }
        }
    }
}

impl Default for BackgroundCache {
    fn default() -> Self {
        Self::new()
    }
}

pub fn resolve_path(image: &ImageRef, base: Option<&Path>) -> PathBuf {
    let raw = image.as_str().strip_prefix("file://").unwrap_or(image.as_str());
    let path = PathBuf::from(raw);
    match base {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    }
}

fn read_image_bytes(image: &ImageRef, base: Option<&Path>) -> Result<Vec<u8>> {
    if image.is_remote() {
        let bytes = reqwest::blocking::get(image.as_str())?
            .error_for_status()?
            .bytes()?;
        return Ok(bytes.to_vec());
    }
    let path = resolve_path(image, base);
    fs::read(&path).with_context(|| format!("reading {}", path.display()))
}

pub fn decode(bytes: &[u8]) -> Result<egui::ColorImage> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Ok(egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn relative_paths_use_base_dir() {
        let base = Path::new("/chats");
        assert_eq!(
            resolve_path(&ImageRef::new("bg/hall.png"), Some(base)),
            PathBuf::from("/chats/bg/hall.png")
        );
        assert_eq!(
            resolve_path(&ImageRef::new("file:///abs/x.png"), Some(base)),
            PathBuf::from("/abs/x.png")
        );
        assert_eq!(resolve_path(&ImageRef::new("x.png"), None), PathBuf::from("x.png"));
    }

    #[test]
    fn png_bytes_decode_to_pixels() {
        let img = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.size, [3, 2]);
        assert!(decode(b"not an image").is_err());
    }
}
