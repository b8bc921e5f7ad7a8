//! Wrapper for invoking external command-line tools with per-invocation log files.
//!
//! Every invocation is described by a tool name and three freeform parameter strings.
//! The strings are split with shell word rules, joined into one argv vector and executed
//! without a shell. Standard output and standard error go to
//! `<logdir>/<tool>_<sha256>.out` and `.err`, where the digest is taken over the
//! space-joined command, so re-running an identical step reuses the same log names.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::process::Command;

use crate::config::defs::PipelineError;


#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenizeError {
    #[error("unterminated {quote} quote in '{input}'")]
    UnterminatedQuote { quote: char, input: String },

    #[error("trailing backslash in '{input}'")]
    TrailingEscape { input: String },
}

#[derive(Clone, Copy, PartialEq)]
enum QuoteState {
    Normal,
    Single,
    Double,
}

/// Splits a parameter string into words following POSIX shell quoting rules.
///
/// Whitespace outside quotes separates words. Quote characters are removed, and quoted
/// runs glue onto any adjacent unquoted characters, so `-i 'escaped in'` yields
/// `["-i", "escaped in"]`. Inside single quotes everything is literal. Inside double quotes
/// a backslash only escapes `\`, `"`, `$` and `` ` ``.
///
/// # Arguments
///
/// * `input` - Raw parameter string. Empty or blank strings yield no words.
///
/// # Returns
/// Result<Vec<String>, TokenizeError>: the words, or an error for an unterminated quote
/// or a dangling backslash.
///
pub fn tokenize(input: &str) -> Result<Vec<String>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // distinguishes an empty quoted word ('') from no word at all
    let mut in_word = false;
    let mut state = QuoteState::Normal;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match state {
            QuoteState::Normal => match c {
                '\'' => {
                    state = QuoteState::Single;
                    in_word = true;
                }
                '"' => {
                    state = QuoteState::Double;
                    in_word = true;
                }
                '\\' => {
                    let escaped = chars.next().ok_or_else(|| TokenizeError::TrailingEscape {
                        input: input.to_string(),
                    })?;
                    // backslash-newline is a line continuation
                    if escaped != '\n' {
                        current.push(escaped);
                        in_word = true;
                    }
                }
                c if c.is_whitespace() => {
                    if in_word {
                        tokens.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
            QuoteState::Single => match c {
                '\'' => state = QuoteState::Normal,
                c => current.push(c),
            },
            QuoteState::Double => match c {
                '"' => state = QuoteState::Normal,
                '\\' => {
                    let escaped = chars.next().ok_or_else(|| TokenizeError::UnterminatedQuote {
                        quote: '"',
                        input: input.to_string(),
                    })?;
                    match escaped {
                        '\\' | '"' | '$' | '`' => current.push(escaped),
                        '\n' => {}
                        other => {
                            current.push('\\');
                            current.push(other);
                        }
                    }
                }
                c => current.push(c),
            },
        }
    }

    match state {
        QuoteState::Single => Err(TokenizeError::UnterminatedQuote {
            quote: '\'',
            input: input.to_string(),
        }),
        QuoteState::Double => Err(TokenizeError::UnterminatedQuote {
            quote: '"',
            input: input.to_string(),
        }),
        QuoteState::Normal => {
            if in_word {
                tokens.push(current);
            }
            Ok(tokens)
        }
    }
}


/// Quotes a single argument so that `tokenize` returns it unchanged as one word.
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c));
    if plain {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// `shell_quote` for paths.
pub fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}


/// One external tool call: the resolved command and where its output is logged.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    tool: String,
    command: Vec<String>,
    command_as_str: String,
    out_log: PathBuf,
    err_log: PathBuf,
    outfile: Option<PathBuf>,
}

impl ExternalTool {
    /// Builds the command and log paths and makes sure `logdir` exists.
    ///
    /// # Arguments
    ///
    /// * `tool` - Executable name or path.
    /// * `input` - Input flags, placed last.
    /// * `output` - Output flags, placed after `params`.
    /// * `params` - Any other parameters, placed directly after the tool.
    /// * `logdir` - Directory receiving the `.out`/`.err` logs. Created with parents.
    /// * `outfile` - For tools that write their product to stdout, the path the stdout
    ///   log is copied to after a successful run.
    ///
    /// # Returns
    /// Result<ExternalTool, PipelineError>
    ///
    pub fn new(
        tool: &str,
        input: &str,
        output: &str,
        params: &str,
        logdir: &Path,
        outfile: Option<PathBuf>,
    ) -> Result<Self, PipelineError> {
        let command = Self::build_command(tool, input, output, params)
            .map_err(|source| PipelineError::Tokenize { tool: tool.to_string(), source })?;
        let command_as_str = command.join(" ");
        let digest = command_digest(&command_as_str);

        let out_log = logdir.join(format!("{}_{}.out", tool_stem(tool), digest));
        let err_log = logdir.join(format!("{}_{}.err", tool_stem(tool), digest));
        fs::create_dir_all(logdir)?;

        Ok(Self {
            tool: tool.to_string(),
            command,
            command_as_str,
            out_log,
            err_log,
            outfile,
        })
    }

    /// Assembles `[tool] + params + output + input`. Downstream tools are positional
    /// argument sensitive, so this order is fixed.
    pub fn build_command(
        tool: &str,
        input: &str,
        output: &str,
        params: &str,
    ) -> Result<Vec<String>, TokenizeError> {
        let mut command = vec![tool.to_string()];
        command.extend(tokenize(params)?);
        command.extend(tokenize(output)?);
        command.extend(tokenize(input)?);
        Ok(command)
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn command_as_str(&self) -> &str {
        &self.command_as_str
    }

    pub fn out_log(&self) -> &Path {
        &self.out_log
    }

    pub fn err_log(&self) -> &Path {
        &self.err_log
    }

    pub fn outfile(&self) -> Option<&Path> {
        self.outfile.as_deref()
    }

    /// Runs the command to completion with stdout and stderr sent to the log files.
    ///
    /// Both logs are truncated first. Nothing is retried.
    ///
    /// # Returns
    /// Result<(), PipelineError>: `ToolFailed` with the exit code and log paths if the
    /// process exits unsuccessfully.
    ///
    pub async fn run(&self) -> Result<(), PipelineError> {
        info!("Running: {}", self.command_as_str);
        debug!("Logging to {} and {}", self.out_log.display(), self.err_log.display());

        let out_file = File::create(&self.out_log)?;
        let err_file = File::create(&self.err_log)?;

        let mut child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::from(out_file))
            .stderr(Stdio::from(err_file))
            .spawn()
            .map_err(|e| PipelineError::ToolSpawn {
                tool: self.tool.clone(),
                error: e.to_string(),
            })?;

        let status = child.wait().await?;
        if !status.success() {
            return Err(PipelineError::ToolFailed {
                tool: self.tool.clone(),
                exit_code: status.code(),
                out_log: self.out_log.clone(),
                err_log: self.err_log.clone(),
            });
        }

        if let Some(outfile) = &self.outfile {
            fs::copy(&self.out_log, outfile)?;
            debug!("Copied {} output to {}", self.tool, outfile.display());
        }
        Ok(())
    }

    /// Runs each tool in order, stopping at the first failure.
    pub async fn run_tools(tools: &[ExternalTool]) -> Result<(), PipelineError> {
        for tool in tools {
            tool.run().await?;
        }
        Ok(())
    }
}


/// Hex SHA-256 of the joined command. Only used as a stable filename suffix.
fn command_digest(command_as_str: &str) -> String {
    Sha256::digest(command_as_str.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Log files are named after the executable, not its full path.
fn tool_stem(tool: &str) -> &str {
    Path::new(tool)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(tool)
}
