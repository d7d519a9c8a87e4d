//! Document and image lookup collaborators.
//!
//! The pager core never touches storage. These traits are the boundary, with
//! filesystem implementations that follow the `books/<id>/book.txt` and
//! `books/<id>/images/image-N.<ext>` layout.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use crate::error::{PagerError, Result};
use crate::tokenizer::{ImageRef, ImageSource, Token};

/// Extensions probed, in order, for each image reference.
pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".JPG", ".PNG"];

/// Header bytes read when sniffing intrinsic image dimensions.
const IMAGE_HEADER_BYTES: u64 = 64 * 1024;

const DEFAULT_TEXT_CANDIDATES: &[&str] = &["{id}/book.txt", "{id}/{id}.txt", "{id}.txt"];

/// Text notice substituted for an image that could not be located.
pub fn missing_image_notice(image: &ImageRef) -> String {
    format!("Missing {}", image.stem())
}

/// Source of raw document text.
pub trait DocumentSource {
    /// Fetch the full text of document `id`.
    fn fetch_document(&self, id: &str) -> Result<String>;
}

/// Maps image references to usable locations.
pub trait ImageResolver {
    /// `None` means the image is unresolved.
    fn resolve(&self, image: &ImageRef) -> Option<ImageSource>;
}

impl<F> ImageResolver for F
where
    F: Fn(&ImageRef) -> Option<ImageSource>,
{
    fn resolve(&self, image: &ImageRef) -> Option<ImageSource> {
        self(image)
    }
}

/// Bind every image reference through `resolver`.
///
/// Unresolved references become a `Missing image-N` text token so the packer
/// only ever sees images it can lay out.
pub fn resolve_images<R: ImageResolver + ?Sized>(tokens: Vec<Token>, resolver: &R) -> Vec<Token> {
    tokens
        .into_iter()
        .map(|token| match token {
            Token::ImageRef(image) => {
                let source = match &image.source {
                    Some(source) => Some(source.clone()),
                    None => resolver.resolve(&image),
                };
                bind_image(image, source)
            }
            other => other,
        })
        .collect()
}

pub(crate) fn bind_image(mut image: ImageRef, source: Option<ImageSource>) -> Token {
    match source {
        Some(source) => {
            image.source = Some(source);
            Token::ImageRef(image)
        }
        None => {
            log::warn!("unresolved image reference {}", image.stem());
            Token::text(missing_image_notice(&image))
        }
    }
}

/// In-memory resolver keyed by image number.
#[derive(Clone, Debug, Default)]
pub struct MapImageResolver {
    images: HashMap<String, ImageSource>,
}

impl MapImageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, number: impl Into<String>, source: ImageSource) -> Self {
        self.images.insert(number.into(), source);
        self
    }
}

impl ImageResolver for MapImageResolver {
    fn resolve(&self, image: &ImageRef) -> Option<ImageSource> {
        self.images.get(&image.number).cloned()
    }
}

/// Filesystem document source rooted at a books directory.
#[derive(Clone, Debug)]
pub struct FsDocumentSource {
    root: PathBuf,
    candidates: Vec<String>,
}

impl FsDocumentSource {
    /// Source that looks for `<root>/<id>/book.txt` and a few fallbacks.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            candidates: DEFAULT_TEXT_CANDIDATES
                .iter()
                .map(|c| (*c).to_string())
                .collect(),
        }
    }

    /// Replace candidate templates. `{id}` is substituted with the document id.
    pub fn with_candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidate paths for `id`, in probe order.
    pub fn candidate_paths(&self, id: &str) -> Result<Vec<PathBuf>> {
        validate_document_id(id)?;
        Ok(self
            .candidates
            .iter()
            .map(|template| self.root.join(template.replace("{id}", id)))
            .collect())
    }

    /// Asynchronous variant of [`DocumentSource::fetch_document`].
    #[cfg(feature = "async")]
    pub async fn fetch_document_async(&self, id: &str) -> Result<String> {
        for path in self.candidate_paths(id)? {
            match tokio::fs::read(&path).await {
                Ok(bytes) => return Ok(decode_text(bytes)),
                Err(err) => log::debug!("document candidate {} skipped: {err}", path.display()),
            }
        }
        Err(PagerError::unavailable(id, "no candidate text file found"))
    }
}

impl DocumentSource for FsDocumentSource {
    fn fetch_document(&self, id: &str) -> Result<String> {
        for path in self.candidate_paths(id)? {
            match std::fs::read(&path) {
                Ok(bytes) => {
                    log::debug!("loaded document {id} from {}", path.display());
                    return Ok(decode_text(bytes));
                }
                Err(err) => log::debug!("document candidate {} skipped: {err}", path.display()),
            }
        }
        Err(PagerError::unavailable(id, "no candidate text file found"))
    }
}

fn validate_document_id(id: &str) -> Result<()> {
    let invalid = id.is_empty()
        || id == "."
        || id.contains("..")
        || id.contains('/')
        || id.contains('\\')
        || id.contains('\0');
    if invalid {
        return Err(PagerError::unavailable(id, "invalid document id"));
    }
    Ok(())
}

fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}

/// Filesystem image resolver probing directories and extensions in order.
#[derive(Clone, Debug)]
pub struct FsImageResolver {
    dirs: Vec<PathBuf>,
    extensions: Vec<String>,
    relative_to: Option<PathBuf>,
}

impl FsImageResolver {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
            extensions: IMAGE_EXTENSIONS.iter().map(|e| (*e).to_string()).collect(),
            relative_to: None,
        }
    }

    /// Resolver for a book laid out as `<root>/<id>/images/`, falling back to
    /// a shared `<root>/images/` directory.
    pub fn for_book(root: impl AsRef<Path>, id: &str) -> Self {
        let root = root.as_ref();
        Self::new([root.join(id).join("images"), root.join("images")])
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Report locations relative to `base` instead of as full paths.
    pub fn with_locations_relative_to(mut self, base: impl Into<PathBuf>) -> Self {
        self.relative_to = Some(base.into());
        self
    }

    fn candidates<'a>(&'a self, image: &'a ImageRef) -> impl Iterator<Item = PathBuf> + 'a {
        let stem = image.stem();
        self.dirs.iter().flat_map(move |dir| {
            let stem = stem.clone();
            self.extensions
                .iter()
                .map(move |ext| dir.join(format!("{stem}{ext}")))
        })
    }

    fn source_for(&self, path: &Path, header: &[u8]) -> ImageSource {
        let shown = self
            .relative_to
            .as_ref()
            .and_then(|base| relative_path(path, base))
            .unwrap_or_else(|| path.to_path_buf());
        let location = shown.to_string_lossy().replace('\\', "/");
        let source = ImageSource::new(location);
        match infer_image_dimensions(header) {
            Some((w, h)) => source.with_dimensions(w, h),
            None => source,
        }
    }

    /// Asynchronous variant of [`ImageResolver::resolve`].
    #[cfg(feature = "async")]
    pub async fn resolve_async(&self, image: &ImageRef) -> Option<ImageSource> {
        for path in self.candidates(image) {
            let Ok(meta) = tokio::fs::metadata(&path).await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let header = read_header_async(&path).await.unwrap_or_default();
            return Some(self.source_for(&path, &header));
        }
        None
    }
}

impl ImageResolver for FsImageResolver {
    fn resolve(&self, image: &ImageRef) -> Option<ImageSource> {
        let path = self.candidates(image).find(|path| path.is_file())?;
        let header = read_header(&path).unwrap_or_default();
        Some(self.source_for(&path, &header))
    }
}

/// Asynchronous [`resolve_images`] for the filesystem resolver.
#[cfg(feature = "async")]
pub async fn resolve_images_async(tokens: Vec<Token>, resolver: &FsImageResolver) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        out.push(match token {
            Token::ImageRef(image) if image.source.is_none() => {
                let source = resolver.resolve_async(&image).await;
                bind_image(image, source)
            }
            other => other,
        });
    }
    out
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::new();
    File::open(path)?
        .take(IMAGE_HEADER_BYTES)
        .read_to_end(&mut header)?;
    Ok(header)
}

#[cfg(feature = "async")]
async fn read_header_async(path: &Path) -> std::io::Result<Vec<u8>> {
    use tokio::io::AsyncReadExt;

    let mut header = Vec::new();
    tokio::fs::File::open(path)
        .await?
        .take(IMAGE_HEADER_BYTES)
        .read_to_end(&mut header)
        .await?;
    Ok(header)
}

/// `path` expressed relative to directory `base`, walking up with `..` where
/// the two diverge. Relative inputs are anchored at the working directory
/// first. `None` when no relative form exists (different drive prefixes).
fn relative_path(path: &Path, base: &Path) -> Option<PathBuf> {
    let path = lexical_absolute(path)?;
    let base = lexical_absolute(base)?;
    let mut path_parts = path.components().peekable();
    let mut base_parts = base.components().peekable();
    match (path_parts.peek(), base_parts.peek()) {
        (Some(Component::Prefix(a)), Some(Component::Prefix(b))) if a != b => return None,
        _ => {}
    }
    while let (Some(a), Some(b)) = (path_parts.peek(), base_parts.peek()) {
        if a != b {
            break;
        }
        path_parts.next();
        base_parts.next();
    }
    let mut out: PathBuf = base_parts.map(|_| Component::ParentDir).collect();
    out.extend(path_parts);
    Some(out)
}

fn lexical_absolute(path: &Path) -> Option<PathBuf> {
    let absolute = std::path::absolute(path).ok()?;
    let mut out = PathBuf::new();
    for part in absolute.components() {
        match part {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    Some(out)
}

/// Intrinsic `(width, height)` from a PNG, JPEG, GIF, or WebP header.
pub fn infer_image_dimensions(bytes: &[u8]) -> Option<(u16, u16)> {
    png_dimensions(bytes)
        .or_else(|| jpeg_dimensions(bytes))
        .or_else(|| gif_dimensions(bytes))
        .or_else(|| webp_dimensions(bytes))
}

fn be16(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 2)?;
    Some(u32::from(u16::from_be_bytes([b[0], b[1]])))
}

fn le16(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 2)?;
    Some(u32::from(u16::from_le_bytes([b[0], b[1]])))
}

fn le24(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 3)?;
    Some(u32::from(b[0]) | (u32::from(b[1]) << 8) | (u32::from(b[2]) << 16))
}

fn dims(width: u32, height: u32) -> Option<(u16, u16)> {
    let w = u16::try_from(width).ok().filter(|w| *w > 0)?;
    let h = u16::try_from(height).ok().filter(|h| *h > 0)?;
    Some((w, h))
}

fn png_dimensions(bytes: &[u8]) -> Option<(u16, u16)> {
    if !bytes.starts_with(b"\x89PNG\r\n\x1a\n") || bytes.get(12..16)? != b"IHDR" {
        return None;
    }
    let word = |at: usize| -> Option<u32> {
        let b = bytes.get(at..at + 4)?;
        Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    };
    dims(word(16)?, word(20)?)
}

fn gif_dimensions(bytes: &[u8]) -> Option<(u16, u16)> {
    if !(bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a")) {
        return None;
    }
    dims(le16(bytes, 6)?, le16(bytes, 8)?)
}

fn jpeg_dimensions(bytes: &[u8]) -> Option<(u16, u16)> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut at = 2usize;
    loop {
        while *bytes.get(at)? != 0xFF {
            at += 1;
        }
        while *bytes.get(at)? == 0xFF {
            at += 1;
        }
        let marker = *bytes.get(at)?;
        at += 1;
        if marker == 0xD9 || marker == 0xDA {
            return None;
        }
        let segment_len = be16(bytes, at)? as usize;
        if segment_len < 2 {
            return None;
        }
        let is_frame_header = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame_header {
            let height = be16(bytes, at + 3)?;
            let width = be16(bytes, at + 5)?;
            return dims(width, height);
        }
        at += segment_len;
    }
}

fn webp_dimensions(bytes: &[u8]) -> Option<(u16, u16)> {
    if !bytes.starts_with(b"RIFF") || bytes.get(8..12)? != b"WEBP" {
        return None;
    }
    let mut chunk = 12usize;
    while let Some(tag) = bytes.get(chunk..chunk + 4) {
        let len_bytes = bytes.get(chunk + 4..chunk + 8)?;
        let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        let body = chunk + 8;
        match tag {
            b"VP8X" => return dims(le24(bytes, body + 4)? + 1, le24(bytes, body + 7)? + 1),
            b"VP8L" if *bytes.get(body)? == 0x2F => {
                let b = bytes.get(body + 1..body + 5)?;
                let bits = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                return dims((bits & 0x3FFF) + 1, ((bits >> 14) & 0x3FFF) + 1);
            }
            b"VP8 " => {
                if bytes.get(body + 3..body + 6)? != [0x9D, 0x01, 0x2A] {
                    return None;
                }
                return dims(le16(bytes, body + 6)? & 0x3FFF, le16(bytes, body + 8)? & 0x3FFF);
            }
            _ => {}
        }
        chunk = body + len + (len & 1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{tokenize, TokenizerOptions};

    fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 2, 0, 0, 0]);
        bytes
    }

    #[test]
    fn unresolved_image_degrades_to_missing_notice() {
        let tokens = tokenize("{image-4}", &TokenizerOptions::default());
        let resolved = resolve_images(tokens, &MapImageResolver::new());
        assert_eq!(resolved, vec![Token::text("Missing image-4")]);
    }

    #[test]
    fn resolved_image_keeps_its_source() {
        let tokens = tokenize("{image-1}", &TokenizerOptions::default());
        let resolver = MapImageResolver::new().with_image("1", ImageSource::new("a.jpg"));
        let resolved = resolve_images(tokens, &resolver);
        let Token::ImageRef(image) = &resolved[0] else {
            panic!("expected image token, got {:?}", resolved[0]);
        };
        assert_eq!(image.source.as_ref().map(|s| s.location.as_str()), Some("a.jpg"));
    }

    #[test]
    fn closures_act_as_resolvers() {
        let tokens = tokenize("{image-2} {image-3}", &TokenizerOptions::default());
        let resolved = resolve_images(tokens, &|image: &ImageRef| {
            (image.number == "2").then(|| ImageSource::new("two.png"))
        });
        assert!(matches!(resolved[0], Token::ImageRef(_)));
        assert_eq!(resolved[1], Token::text("Missing image-3"));
    }

    #[test]
    fn fs_document_source_tries_candidates_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("trip")).unwrap();
        std::fs::write(dir.path().join("trip.txt"), "fallback").unwrap();
        let source = FsDocumentSource::new(dir.path());
        assert_eq!(source.fetch_document("trip").unwrap(), "fallback");

        std::fs::write(dir.path().join("trip").join("book.txt"), "primary").unwrap();
        assert_eq!(source.fetch_document("trip").unwrap(), "primary");
    }

    #[test]
    fn fs_document_source_reports_missing_and_invalid_ids() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsDocumentSource::new(dir.path());
        assert!(source.fetch_document("nope").unwrap_err().is_source_unavailable());
        assert!(source.fetch_document("../etc").unwrap_err().is_source_unavailable());
        assert!(source.fetch_document("").unwrap_err().is_source_unavailable());
    }

    #[test]
    fn fs_image_resolver_probes_extensions_and_reads_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("trip").join("images");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("image-7.png"), png_header(640, 480)).unwrap();
        std::fs::write(images.join("image-8.webp"), b"not really webp").unwrap();

        let resolver =
            FsImageResolver::for_book(dir.path(), "trip").with_locations_relative_to(dir.path());
        let seven = resolver.resolve(&ImageRef::new("7")).unwrap();
        assert_eq!(seven.location, "trip/images/image-7.png");
        assert_eq!(seven.dimensions(), Some((640, 480)));

        let eight = resolver.resolve(&ImageRef::new("8")).unwrap();
        assert_eq!(eight.dimensions(), None);
        assert!(resolver.resolve(&ImageRef::new("9")).is_none());
    }

    #[test]
    fn relative_path_walks_up_out_of_the_output_directory() {
        let relative = relative_path(
            Path::new("books/trip/images/image-1.jpg"),
            Path::new("target/web-preview"),
        )
        .unwrap();
        assert_eq!(relative, Path::new("../../books/trip/images/image-1.jpg"));

        let nested = relative_path(Path::new("./out/img/a.png"), Path::new("out")).unwrap();
        assert_eq!(nested, Path::new("img/a.png"));
        assert_eq!(
            relative_path(Path::new("a/b/../c.png"), Path::new("a/d/")).unwrap(),
            Path::new("../c.png")
        );
    }

    #[test]
    fn fs_image_locations_resolve_from_a_sibling_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let books = dir.path().join("books");
        let images = books.join("trip").join("images");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("image-1.png"), png_header(20, 10)).unwrap();
        let out_dir = dir.path().join("target").join("web-preview");

        let resolver =
            FsImageResolver::for_book(&books, "trip").with_locations_relative_to(&out_dir);
        let source = resolver.resolve(&ImageRef::new("1")).unwrap();
        assert_eq!(source.location, "../../books/trip/images/image-1.png");
        std::fs::create_dir_all(&out_dir).unwrap();
        assert!(out_dir.join(&source.location).is_file());
    }

    #[cfg(feature = "async")]
    #[tokio::test(flavor = "current_thread")]
    async fn async_fetch_follows_candidates_and_reports_missing_books() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("trip")).unwrap();
        std::fs::write(dir.path().join("trip").join("book.txt"), "Ferry at dawn.").unwrap();
        let source = FsDocumentSource::new(dir.path());

        assert_eq!(source.fetch_document_async("trip").await.unwrap(), "Ferry at dawn.");
        let err = source.fetch_document_async("elsewhere").await.unwrap_err();
        assert!(err.is_source_unavailable());
        assert!(source.fetch_document_async("..").await.unwrap_err().is_source_unavailable());
    }

    #[cfg(feature = "async")]
    #[tokio::test(flavor = "current_thread")]
    async fn async_resolution_binds_present_images_and_degrades_missing_ones() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("trip").join("images");
        std::fs::create_dir_all(&images).unwrap();
        let mut png = png_header(800, 600);
        png.resize(IMAGE_HEADER_BYTES as usize * 2, 0);
        std::fs::write(images.join("image-1.png"), png).unwrap();

        let resolver =
            FsImageResolver::for_book(dir.path(), "trip").with_locations_relative_to(dir.path());
        let tokens = tokenize("{image-1}\n\n{image-2}", &TokenizerOptions::default());
        let resolved = resolve_images_async(tokens, &resolver).await;

        let Token::ImageRef(image) = &resolved[0] else {
            panic!("expected image token, got {:?}", resolved[0]);
        };
        let source = image.source.as_ref().unwrap();
        assert_eq!(source.location, "trip/images/image-1.png");
        assert_eq!(source.dimensions(), Some((800, 600)));
        assert_eq!(resolved[1], Token::text("Missing image-2"));
        assert_eq!(resolved, resolve_images(resolved.clone(), &resolver));
    }

    #[test]
    fn infer_image_dimensions_parses_common_formats() {
        assert_eq!(infer_image_dimensions(&png_header(3, 2)), Some((3, 2)));

        let gif = [b'G', b'I', b'F', b'8', b'9', b'a', 5, 0, 4, 0];
        assert_eq!(infer_image_dimensions(&gif), Some((5, 4)));

        let jpeg = [
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00, 0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00,
            0x20, 0x00, 0x30, 0x03,
        ];
        assert_eq!(infer_image_dimensions(&jpeg), Some((48, 32)));

        let mut webp = b"RIFF\0\0\0\0WEBPVP8X".to_vec();
        webp.extend_from_slice(&10u32.to_le_bytes());
        webp.extend_from_slice(&[0, 0, 0, 0, 99, 0, 0, 49, 0, 0]);
        assert_eq!(infer_image_dimensions(&webp), Some((100, 50)));

        assert_eq!(infer_image_dimensions(b"plain text"), None);
    }
}
