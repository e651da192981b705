//! Texture compilation
//!
//! Picks a block compression format from the source's channel layout and the
//! requested quality, then hands the file to the texture transcoder.

use crate::dispatch::CompileContext;
use crate::error::CompileResult;
use crate::process::run_tool_to_file;
use image::{ColorType, ImageDecoder};
use std::fmt;
use std::path::Path;
use void_asset::{AssetKey, CompressionQuality, ProjectSettings, TextureImporter, TextureType};

/// Runtime texture format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Keep whatever the transcoder picks
    Unknown,
    BC1,
    BC2,
    BC3,
    BC4,
    BC5,
    BC6H,
    BC7,
    R8,
    RG8,
    RGBA8,
    RGBA16F,
    RGBA32F,
}

impl TextureFormat {
    /// Name understood by `texturec -t`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::BC1 => "BC1",
            Self::BC2 => "BC2",
            Self::BC3 => "BC3",
            Self::BC4 => "BC4",
            Self::BC5 => "BC5",
            Self::BC6H => "BC6H",
            Self::BC7 => "BC7",
            Self::R8 => "R8",
            Self::RG8 => "RG8",
            Self::RGBA8 => "RGBA8",
            Self::RGBA16F => "RGBA16F",
            Self::RGBA32F => "RGBA32F",
        }
    }

    /// Formats slow enough to warrant the fastest encoder setting
    pub fn is_slow_to_encode(self) -> bool {
        matches!(self, Self::BC6H | Self::BC7)
    }
}

impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel layout of a source image
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceFormat {
    pub channels: u8,
    pub has_alpha: bool,
    pub is_hdr: bool,
}

impl SourceFormat {
    pub const RGBA8: Self = Self::ldr(4, true);
    pub const RGB8: Self = Self::ldr(3, false);
    pub const R8: Self = Self::ldr(1, false);
    pub const RG8: Self = Self::ldr(2, false);
    pub const RGBA16F: Self = Self {
        channels: 4,
        has_alpha: true,
        is_hdr: true,
    };
    pub const RGB32F: Self = Self {
        channels: 3,
        has_alpha: false,
        is_hdr: true,
    };

    const fn ldr(channels: u8, has_alpha: bool) -> Self {
        Self {
            channels,
            has_alpha,
            is_hdr: false,
        }
    }

    /// Layout of a decoded color type
    pub fn from_color_type(color: ColorType) -> Self {
        Self {
            channels: color.channel_count(),
            has_alpha: color.has_alpha(),
            is_hdr: matches!(color, ColorType::Rgb32F | ColorType::Rgba32F),
        }
    }

    /// Read a file's header, falling back to RGBA8 when the decoder can't
    pub fn from_file(path: &Path) -> Self {
        let color = image::ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(image::ImageError::from)
            .and_then(|reader| reader.into_decoder())
            .map(|decoder| decoder.color_type());

        match color {
            Ok(color) => Self::from_color_type(color),
            Err(e) => {
                log::trace!("Could not read the header of {}: {}, assuming RGBA8", path.display(), e);
                Self::RGBA8
            }
        }
    }
}

/// Pick the block format for a source, first match wins
///
/// High quality deliberately stays on BC1/BC3: BC7 encodes too slowly.
pub fn select_format(source: SourceFormat, extension: &str, quality: CompressionQuality) -> TextureFormat {
    if quality == CompressionQuality::None {
        return TextureFormat::Unknown;
    }

    let ext = extension.trim_start_matches('.').to_lowercase();
    if source.is_hdr || ext == "hdr" || ext == "exr" {
        return TextureFormat::BC6H;
    }

    match source.channels {
        1 => TextureFormat::BC4,
        2 => TextureFormat::BC5,
        _ if !source.has_alpha => TextureFormat::BC1,
        _ => TextureFormat::BC3,
    }
}

/// Arguments for one texturec run
pub fn texturec_args(
    input: &Path,
    output: &Path,
    importer: &TextureImporter,
    project: &ProjectSettings,
    root: &str,
    source: SourceFormat,
) -> Vec<String> {
    let compression = project.resolve_compression(importer.quality.compression);
    let max_size = project.resolve_max_size(importer.quality.max_size);
    let extension = input.extension().and_then(|e| e.to_str()).unwrap_or("");
    let format = select_format(source, extension, compression);

    let mut args = vec![
        "-f".to_string(),
        input.display().to_string(),
        "-o".to_string(),
        output.display().to_string(),
        "--as".to_string(),
        "dds".to_string(),
    ];

    if root == "app" && format != TextureFormat::Unknown {
        args.push("-t".into());
        args.push(format.to_string());
        if format.is_slow_to_encode() {
            log::info!("Compressing to {}. May take a while.", format);
            args.push("-q".into());
            args.push("fastest".into());
        } else if compression == CompressionQuality::High {
            args.push("-q".into());
            args.push("highest".into());
        }
    }

    if importer.generate_mipmaps {
        args.push("-m".into());
    }

    if let Some(pixels) = max_size.pixels() {
        args.push("--max".into());
        args.push(pixels.to_string());
    }

    match importer.texture_type {
        TextureType::Equirect => args.push("--equirect".into()),
        TextureType::NormalMap => args.push("--normalmap".into()),
        TextureType::Automatic => {}
    }

    args
}

/// Transcode `source` into `output`
pub fn compile_texture(
    ctx: &CompileContext,
    key: &AssetKey,
    source: &Path,
    output: &Path,
    importer: &TextureImporter,
) -> CompileResult<()> {
    let config = ctx.config();
    let program = config.tools.texturec.display().to_string();
    let format = SourceFormat::from_file(source);

    run_tool_to_file(ctx.runner(), &program, output, |temp| {
        texturec_args(source, temp, importer, &config.project, key.root(), format)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use void_asset::TextureSize;

    fn importer(compression: CompressionQuality) -> TextureImporter {
        let mut importer = TextureImporter::default();
        importer.quality.compression = compression;
        importer
    }

    fn args(importer: &TextureImporter, root: &str, input: &str) -> Vec<String> {
        texturec_args(
            &PathBuf::from(input),
            &PathBuf::from("out.dds"),
            importer,
            &ProjectSettings::default(),
            root,
            SourceFormat::RGBA8,
        )
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_format_rules() {
        use CompressionQuality::*;

        assert_eq!(select_format(SourceFormat::RGBA8, ".png", None), TextureFormat::Unknown);
        assert_eq!(select_format(SourceFormat::RGBA16F, ".dds", Low), TextureFormat::BC6H);
        assert_eq!(select_format(SourceFormat::RGB8, ".HDR", Normal), TextureFormat::BC6H);
        assert_eq!(select_format(SourceFormat::RGBA8, "exr", High), TextureFormat::BC6H);
        assert_eq!(select_format(SourceFormat::R8, ".png", Normal), TextureFormat::BC4);
        assert_eq!(select_format(SourceFormat::RG8, ".png", Normal), TextureFormat::BC5);
    }

    #[test]
    fn test_high_quality_never_picks_bc7() {
        for quality in [CompressionQuality::Low, CompressionQuality::Normal, CompressionQuality::High] {
            assert_eq!(select_format(SourceFormat::RGB8, ".png", quality), TextureFormat::BC1);
            assert_eq!(select_format(SourceFormat::RGBA8, ".png", quality), TextureFormat::BC3);
        }
    }

    #[test]
    fn test_color_type_layout() {
        assert_eq!(SourceFormat::from_color_type(ColorType::L8), SourceFormat::R8);
        assert_eq!(SourceFormat::from_color_type(ColorType::Rgb8), SourceFormat::RGB8);
        assert!(SourceFormat::from_color_type(ColorType::Rgb32F).is_hdr);
        assert!(SourceFormat::from_color_type(ColorType::La8).has_alpha);
    }

    #[test]
    fn test_app_root_gets_format_flag() {
        let args = args(&importer(CompressionQuality::High), "app", "wall.png");
        assert_eq!(&args[..6], &["-f", "wall.png", "-o", "out.dds", "--as", "dds"]);
        assert!(has_pair(&args, "-t", "BC3"));
        assert!(has_pair(&args, "-q", "highest"));
        assert!(args.contains(&"-m".to_string()));
        assert!(has_pair(&args, "--max", "2048"));
    }

    #[test]
    fn test_engine_root_skips_format_flag() {
        let args = args(&importer(CompressionQuality::High), "engine", "wall.png");
        assert!(!args.contains(&"-t".to_string()));
        assert!(!args.contains(&"-q".to_string()));
    }

    #[test]
    fn test_hdr_uses_fastest() {
        let args = args(&importer(CompressionQuality::Normal), "app", "sky.hdr");
        assert!(has_pair(&args, "-t", "BC6H"));
        assert!(has_pair(&args, "-q", "fastest"));
    }

    #[test]
    fn test_project_defaults_and_types() {
        let mut importer = importer(CompressionQuality::ProjectDefault);
        importer.generate_mipmaps = false;
        importer.texture_type = TextureType::NormalMap;
        let project = ProjectSettings {
            default_compression: CompressionQuality::None,
            default_max_size: TextureSize::S512,
        };

        let args = texturec_args(
            Path::new("n.png"),
            Path::new("n.dds"),
            &importer,
            &project,
            "app",
            SourceFormat::RGB8,
        );
        assert!(!args.contains(&"-t".to_string()));
        assert!(!args.contains(&"-m".to_string()));
        assert!(has_pair(&args, "--max", "512"));
        assert_eq!(args.last().map(String::as_str), Some("--normalmap"));
    }
}
