//! Shader compilation
//!
//! Builds `shaderc` invocations for the renderer encoded in the output name,
//! and tracks `#include` edges so edits to shared `.sh` files can recompile
//! the shaders that use them.

use crate::dispatch::CompileContext;
use crate::error::CompileResult;
use crate::process::run_tool_to_file;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use void_asset::{AssetKey, RendererBackend};

/// Shader stage, taken from the file name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    Unknown,
}

impl ShaderStage {
    /// `vs_`, `fs_` and `cs_` prefixes select the stage
    pub fn from_file_stem(stem: &str) -> Self {
        if stem.starts_with("vs_") {
            Self::Vertex
        } else if stem.starts_with("fs_") {
            Self::Fragment
        } else if stem.starts_with("cs_") {
            Self::Compute
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
            Self::Unknown => "unknown",
        }
    }
}

/// `--platform`, `-p` and `-O` values for a renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetProfile {
    pub platform: &'static str,
    pub profile: Option<&'static str>,
    pub optimization: &'static str,
}

/// Target profile for a renderer and stage
pub fn target_profile(renderer: RendererBackend, stage: ShaderStage) -> TargetProfile {
    let graphics = matches!(stage, ShaderStage::Vertex | ShaderStage::Fragment);
    let compute = stage == ShaderStage::Compute;

    let (platform, profile) = match renderer {
        RendererBackend::Vulkan => ("windows", Some("spirv")),
        RendererBackend::Direct3D11 | RendererBackend::Direct3D12 => {
            ("windows", (graphics || compute).then_some("s_5_0"))
        }
        RendererBackend::OpenGLES => ("android", Some("100_es")),
        RendererBackend::OpenGL if graphics => ("linux", Some("140")),
        RendererBackend::OpenGL if compute => ("linux", Some("430")),
        RendererBackend::OpenGL => ("linux", None),
        RendererBackend::Metal => ("osx", Some("metal")),
    };

    let optimization = match renderer {
        RendererBackend::Direct3D11 | RendererBackend::Direct3D12 if compute => "1",
        _ => "3",
    };

    TargetProfile {
        platform,
        profile,
        optimization,
    }
}

/// Renderer encoded in a compiled shader path (`.asset.gl`, `.asset.spirv`, ...)
pub fn renderer_for_output(output: &Path) -> Option<RendererBackend> {
    output
        .extension()
        .and_then(|e| e.to_str())
        .and_then(RendererBackend::from_extension)
}

/// Varying definition file for a shader: `<stem>.io`, `varying.def.io`, `varying.def.sc`
pub fn varying_path(source: &Path) -> PathBuf {
    let dir = source.parent().unwrap_or_else(|| Path::new(""));
    let stem = source.file_stem().and_then(|s| s.to_str()).unwrap_or("");

    let own = dir.join(format!("{}.io", stem));
    if own.exists() {
        return own;
    }
    let shared = dir.join("varying.def.io");
    if shared.exists() {
        return shared;
    }
    dir.join("varying.def.sc")
}

/// Inputs of one shaderc run
#[derive(Debug, Clone)]
pub struct ShaderJob<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub include_dir: &'a Path,
    pub varying: &'a Path,
    pub stage: ShaderStage,
    pub renderer: RendererBackend,
    pub max_bones: u32,
}

/// Arguments for one shaderc run
pub fn shaderc_args(job: &ShaderJob) -> Vec<String> {
    let mut args = vec![
        "-f".to_string(),
        job.input.display().to_string(),
        "-o".to_string(),
        job.output.display().to_string(),
        "-i".to_string(),
        job.include_dir.display().to_string(),
        "--varyingdef".to_string(),
        job.varying.display().to_string(),
        "--type".to_string(),
        job.stage.as_str().to_string(),
        "--define".to_string(),
        format!("BGFX_CONFIG_MAX_BONES={}", job.max_bones),
    ];

    let target = target_profile(job.renderer, job.stage);
    args.push("--platform".into());
    args.push(target.platform.into());
    if let Some(profile) = target.profile {
        args.push("-p".into());
        args.push(profile.into());
    }
    args.push("-O".into());
    args.push(target.optimization.into());
    args
}

/// Compile `source` for the renderer named by `output`
pub fn compile_shader(ctx: &CompileContext, key: &AssetKey, source: &Path, output: &Path) -> CompileResult<()> {
    let config = ctx.config();
    let renderer = renderer_for_output(output).unwrap_or(config.renderer);
    let include_key = AssetKey::parse(&config.shader.include_dir)?;
    let include_dir = ctx.protocols().resolve(&include_key)?;
    let varying = varying_path(source);
    let program = config.tools.shaderc.display().to_string();

    log::trace!("Compiling {} for {}", key, renderer);
    run_tool_to_file(ctx.runner(), &program, output, |temp| {
        shaderc_args(&ShaderJob {
            input: source,
            output: temp,
            include_dir: &include_dir,
            varying: &varying,
            stage: ShaderStage::from_file_stem(key.file_stem()),
            renderer,
            max_bones: config.shader.max_bones,
        })
    })?;
    Ok(())
}

/// `#include` edges between shader sources
#[derive(Debug, Default, Clone)]
pub struct IncludeGraph {
    includes: HashMap<PathBuf, Vec<PathBuf>>,
}

fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// File named by an `#include` line, if the line is one
fn include_target(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start();
    let rest = rest.strip_prefix("include")?.trim();
    let (open, close) = match rest.chars().next()? {
        '"' => ('"', '"'),
        '<' => ('<', '>'),
        _ => return None,
    };
    let inner = rest.strip_prefix(open)?;
    inner.find(close).map(|end| &inner[..end])
}

impl IncludeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan every `.sc` and `.sh` file under `dirs`
    ///
    /// Include names resolve against the including file's directory first,
    /// then against `include_dirs`.
    pub fn scan(dirs: &[PathBuf], include_dirs: &[PathBuf]) -> Self {
        let mut graph = Self::new();
        let mut files = Vec::new();
        for dir in dirs {
            collect_shader_files(dir, &mut files);
        }
        for file in files {
            match fs::read_to_string(&file) {
                Ok(text) => graph.add_source(&file, &text, include_dirs),
                Err(e) => log::warn!("Could not scan {}: {}", file.display(), e),
            }
        }
        graph
    }

    /// Record the includes of one file
    pub fn add_source(&mut self, file: &Path, text: &str, include_dirs: &[PathBuf]) {
        let dir = file.parent().unwrap_or_else(|| Path::new(""));
        let targets = text
            .lines()
            .filter_map(include_target)
            .map(|name| {
                std::iter::once(dir.to_path_buf())
                    .chain(include_dirs.iter().cloned())
                    .map(|base| base.join(name))
                    .find(|candidate| candidate.exists())
                    .unwrap_or_else(|| dir.join(name))
            })
            .map(|p| normalize(&p))
            .collect();
        self.includes.insert(normalize(file), targets);
    }

    /// Forget a file's includes
    pub fn remove_source(&mut self, file: &Path) {
        // A deleted file no longer canonicalizes; its directory still does
        let in_parent = file
            .parent()
            .and_then(|dir| fs::canonicalize(dir).ok())
            .zip(file.file_name())
            .map(|(dir, name)| dir.join(name));
        self.includes.remove(&normalize(file));
        if let Some(path) = in_parent {
            self.includes.remove(&path);
        }
    }

    /// Take every edge of `other`, replacing files both graphs know
    pub fn merge(&mut self, other: IncludeGraph) {
        self.includes.extend(other.includes);
    }

    /// Direct includes of a file
    pub fn includes_of(&self, file: &Path) -> &[PathBuf] {
        self.includes
            .get(&normalize(file))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Shader sources (`.sc`) whose include closure contains `dependency`
    pub fn dependents(&self, dependency: &Path) -> Vec<PathBuf> {
        let target = normalize(dependency);
        let mut found: Vec<PathBuf> = self
            .includes
            .keys()
            .filter(|file| file.extension().and_then(|e| e.to_str()) == Some("sc"))
            .filter(|file| self.reaches(file, &target))
            .cloned()
            .collect();
        found.sort();
        found
    }

    fn reaches(&self, from: &Path, target: &Path) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from.to_path_buf()];
        while let Some(file) = stack.pop() {
            if !visited.insert(file.clone()) {
                continue;
            }
            for next in self.includes.get(&file).into_iter().flatten() {
                if next == target {
                    return true;
                }
                stack.push(next.clone());
            }
        }
        false
    }
}

fn collect_shader_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_shader_files(&path, out);
        } else if matches!(path.extension().and_then(|e| e.to_str()), Some("sc") | Some("sh")) {
            out.push(path);
        }
    }
}
