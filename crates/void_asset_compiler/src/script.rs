//! Script library compilation
//!
//! Every `.cs` source of a root is compiled into one library with the
//! configured C# compiler. Libraries of other roots reference the engine
//! library.

use crate::dispatch::CompileContext;
use crate::error::{CompileError, CompileResult};
use crate::process::run_tool_to_file;
use std::fs;
use std::path::{Path, PathBuf};
use void_asset::{AssetKey, AssetType};

/// Root whose library every other library references
pub const ENGINE_ROOT: &str = "engine";

/// Key of the compiled library of `root`
pub fn script_library_key(root: &str) -> AssetKey {
    AssetKey::from_parts(root, &format!("compiled/scripts/{}-script.dll", root))
}

/// One compiler message tied to a source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDiagnostic {
    pub file: String,
    pub line: u32,
    /// The full message line
    pub message: String,
}

/// Parse `file(line,col): <severity> ...` lines
fn parse_diagnostics(log: &str, severity: &str) -> Vec<ScriptDiagnostic> {
    let marker = format!("): {} ", severity);
    log.lines()
        .filter_map(|line| {
            let line = line.trim_end();
            let end = line.find(&marker)?;
            let open = line[..end].rfind('(')?;
            let (line_no, _column) = line[open + 1..end].split_once(',')?;
            Some(ScriptDiagnostic {
                file: line[..open].trim().to_string(),
                line: line_no.trim().parse().ok()?,
                message: line.to_string(),
            })
        })
        .collect()
}

pub fn parse_compilation_errors(log: &str) -> Vec<ScriptDiagnostic> {
    parse_diagnostics(log, "error")
}

pub fn parse_compilation_warnings(log: &str) -> Vec<ScriptDiagnostic> {
    parse_diagnostics(log, "warning")
}

/// Inputs of one compiler run
#[derive(Debug, Clone, Default)]
pub struct ScriptCompileParams {
    pub files: Vec<PathBuf>,
    /// Library file names to reference
    pub references: Vec<String>,
    /// Directories searched for references
    pub reference_dirs: Vec<PathBuf>,
    pub output: PathBuf,
    pub doc_output: Option<PathBuf>,
    pub debug: bool,
}

/// Compiler arguments in `mcs` syntax
pub fn compiler_args(params: &ScriptCompileParams) -> Vec<String> {
    let mut args = vec![
        "-target:library".to_string(),
        "-nowarn:1591".to_string(),
        format!("-out:{}", params.output.display()),
    ];
    if let Some(doc) = &params.doc_output {
        args.push(format!("-doc:{}", doc.display()));
    }
    if params.debug {
        args.push("-debug".into());
    }
    for dir in &params.reference_dirs {
        args.push(format!("-lib:{}", dir.display()));
    }
    for reference in &params.references {
        args.push(format!("-r:{}", reference));
    }
    args.extend(params.files.iter().map(|f| f.display().to_string()));
    args
}

fn with_added_extension(path: &Path, extension: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(extension);
    PathBuf::from(raw)
}

fn remove_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

fn build_library(ctx: &CompileContext, root: &str, debug: bool) -> CompileResult<()> {
    let protocols = ctx.protocols();
    let output = protocols.resolve(&script_library_key(root))?;
    let debug_symbols = with_added_extension(&output, ".mdb");

    let files: Vec<PathBuf> = ctx
        .assets()
        .source_keys(root, AssetType::Script)
        .iter()
        .map(|key| protocols.resolve(key))
        .collect::<Result<_, _>>()?;

    if files.is_empty() {
        remove_if_present(&output);
        remove_if_present(&debug_symbols);
        if root == ENGINE_ROOT {
            return Err(CompileError::Import("the engine root has no scripts".into()));
        }
        log::trace!("No scripts under '{}', removed stale library", root);
        return Ok(());
    }

    let mut params = ScriptCompileParams {
        files,
        debug,
        doc_output: Some(output.with_extension("xml")),
        ..Default::default()
    };
    if root != ENGINE_ROOT {
        let engine_library = protocols.resolve(&script_library_key(ENGINE_ROOT))?;
        if let Some(name) = engine_library.file_name() {
            params.references.push(name.to_string_lossy().into_owned());
        }
        if let Some(dir) = engine_library.parent() {
            params.reference_dirs.push(dir.to_path_buf());
        }
    }

    let program = ctx.config().tools.script_compiler.display().to_string();
    let result = run_tool_to_file(ctx.runner(), &program, &output, |temp| {
        params.output = temp.to_path_buf();
        log::trace!("Script compile: {} {}", program, compiler_args(&params).join(" "));
        compiler_args(&params)
    });

    match result {
        Ok(run) => {
            if !debug {
                remove_if_present(&debug_symbols);
            }
            if root != ENGINE_ROOT {
                for warning in parse_compilation_warnings(&run.combined()) {
                    log::warn!("{}:{}: {}", warning.file, warning.line, warning.message);
                }
            }
            Ok(())
        }
        Err(CompileError::Process { program, output: log }) => {
            let errors = parse_compilation_errors(&log);
            if errors.is_empty() {
                return Err(CompileError::Process { program, output: log });
            }
            for error in &errors {
                log::error!("{}:{}: {}", error.file, error.line, error.message);
            }
            Err(CompileError::Process {
                program,
                output: format!("{} compilation errors", errors.len()),
            })
        }
        Err(e) => Err(e),
    }
}

/// Compile the script library of `root`
///
/// Without any script sources the stale library is removed; that counts as
/// success except for the engine root.
pub fn compile_script_library(ctx: &CompileContext, root: &str, debug: bool) -> bool {
    match build_library(ctx, root, debug) {
        Ok(()) => true,
        Err(e) => {
            log::error!("Failed compilation of script library '{}' with error: {}", root, e);
            false
        }
    }
}
