use crate::config::CompilerConfig;
use crate::svg;
use log::debug;
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Failure reported by a diagram compiler, carrying its human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Turns a diagram description into SVG markup.
pub trait DiagramCompiler {
    fn compile(&self, id: &str, source: &str) -> Result<String, CompileError>;
}

impl<F> DiagramCompiler for F
where
    F: Fn(&str, &str) -> Result<String, CompileError>,
{
    fn compile(&self, id: &str, source: &str) -> Result<String, CompileError> {
        self(id, source)
    }
}

/// Runs an external renderer (by default `mmdr -e svg`) with the diagram on
/// stdin and reads SVG from stdout.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    args: Vec<String>,
}

impl CommandCompiler {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &CompilerConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }
}

impl DiagramCompiler for CommandCompiler {
    fn compile(&self, id: &str, source: &str) -> Result<String, CompileError> {
        debug!("compiling {id} with {}", self.program);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| CompileError::new(format!("failed to launch {}: {err}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(source.as_bytes()) {
                Ok(()) => {}
                // The renderer may exit before reading everything; its stderr says why.
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {}
                Err(err) => {
                    return Err(CompileError::new(format!("failed to send diagram: {err}")));
                }
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|err| CompileError::new(format!("renderer did not finish: {err}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.trim().trim_start_matches("error:").trim();
            return Err(CompileError::new(if message.is_empty() {
                format!("renderer exited with {}", output.status)
            } else {
                message.to_string()
            }));
        }

        let markup = String::from_utf8_lossy(&output.stdout);
        if !markup.contains("<svg") {
            return Err(CompileError::new("No SVG output"));
        }
        Ok(svg::set_root_attr(&markup, "id", id))
    }
}
