use image::codecs::jpeg::JpegEncoder;
use image::{ImageReader, RgbImage};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Upload and output directories, keyed by the client's file name.
#[derive(Clone, Debug)]
pub struct FileStore {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Failed to encode image {path}: {source}")]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl FileStore {
    pub fn new(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        for dir in [&self.upload_dir, &self.output_dir] {
            fs::create_dir_all(dir).map_err(io_error(dir))?;
        }
        Ok(())
    }

    /// Keeps only the last path component of a client-supplied name.
    pub fn sanitize_file_name(raw: &str) -> Option<String> {
        let name = raw.rsplit(['/', '\\']).next()?.trim();
        match name {
            "" | "." | ".." => None,
            name => Some(name.to_string()),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn upload_path(&self, file_name: &str) -> PathBuf {
        self.upload_dir.join(file_name)
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    pub fn save_upload(&self, file_name: &str, data: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.upload_path(file_name);
        fs::write(&path, data).map_err(io_error(&path))?;
        Ok(path)
    }

    /// Decodes a saved upload by content, not extension, and converts it to RGB.
    pub fn load_upload(&self, file_name: &str) -> Result<RgbImage, StorageError> {
        let path = self.upload_path(file_name);
        let image = ImageReader::open(&path)
            .map_err(io_error(&path))?
            .with_guessed_format()
            .map_err(io_error(&path))?
            .decode()
            .map_err(|source| StorageError::Decode {
                path: path.clone(),
                source,
            })?;
        Ok(image.to_rgb8())
    }

    /// Always JPEG, whatever the extension of `file_name`.
    pub fn save_output(
        &self,
        file_name: &str,
        image: &RgbImage,
        quality: u8,
    ) -> Result<PathBuf, StorageError> {
        let path = self.output_path(file_name);
        let file = File::create(&path).map_err(io_error(&path))?;
        let mut writer = BufWriter::new(file);

        JpegEncoder::new_with_quality(&mut writer, quality)
            .encode_image(image)
            .map_err(|source| StorageError::Encode {
                path: path.clone(),
                source,
            })?;
        writer.flush().map_err(io_error(&path))?;
        Ok(path)
    }

    pub fn read_output(&self, file_name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.output_path(file_name);
        fs::read(&path).map_err(io_error(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FileStore {
        let store = FileStore::new(dir.path().join("uploads"), dir.path().join("outputs"));
        store.ensure_dirs().unwrap();
        store
    }

    #[test]
    fn file_names_are_reduced_to_their_last_component() {
        assert_eq!(FileStore::sanitize_file_name("plane.jpg").as_deref(), Some("plane.jpg"));
        assert_eq!(
            FileStore::sanitize_file_name("../../etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(
            FileStore::sanitize_file_name("C:\\Users\\me\\gate 4.png").as_deref(),
            Some("gate 4.png")
        );
        assert_eq!(FileStore::sanitize_file_name(""), None);
        assert_eq!(FileStore::sanitize_file_name("uploads/"), None);
        assert_eq!(FileStore::sanitize_file_name(".."), None);
    }

    #[test]
    fn ensure_dirs_creates_both_directories() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.upload_dir().is_dir());
        assert!(store.output_dir().is_dir());
    }

    #[test]
    fn upload_is_decoded_regardless_of_extension() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut png = Vec::new();
        RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        store.save_upload("runway.jpg", &png).unwrap();

        let image = store.load_upload("runway.jpg").unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn corrupt_upload_is_a_decode_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save_upload("broken.png", b"not an image").unwrap();
        assert!(matches!(
            store.load_upload("broken.png"),
            Err(StorageError::Decode { .. })
        ));
    }

    #[test]
    fn output_is_written_as_jpeg() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let image = RgbImage::from_pixel(8, 8, Rgb([200, 10, 10]));

        let path = store.save_output("apron.png", &image, 90).unwrap();
        assert_eq!(path, dir.path().join("outputs").join("apron.png"));

        let bytes = store.read_output("apron.png").unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn missing_output_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.read_output("nothing.jpg"),
            Err(StorageError::Io { .. })
        ));
    }
}
