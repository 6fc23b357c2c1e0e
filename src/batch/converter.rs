use super::ConvertError;
use std::path::Path;
use std::process::Command;

pub const DEFAULT_PROGRAM: &str = "sleap-convert";
pub const DEFAULT_ARGS: &str = "--format analysis.csv -o {output} {input}";

/// Turns one pose-tracking project file into a CSV table
pub trait Converter: Sync {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError>;
}

/// Runs an external conversion tool once per file
///
/// Arguments are a template: `{input}` and `{output}` are replaced by the
/// file paths, anything else is passed through unchanged.
#[derive(Debug, Clone)]
pub struct ExternalConverter {
    program: String,
    args: Vec<String>,
}

impl ExternalConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a whitespace-separated argument template
    pub fn from_template(program: impl Into<String>, template: &str) -> Self {
        Self::new(program, template.split_whitespace().map(str::to_string).collect())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn render_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

impl Default for ExternalConverter {
    fn default() -> Self {
        Self::from_template(DEFAULT_PROGRAM, DEFAULT_ARGS)
    }
}

impl Converter for ExternalConverter {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        let args = self.render_args(input, output);
        tracing::debug!("Running {} {}", self.program, args.join(" "));

        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| ConvertError::ConverterSpawn {
                program: self.program.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(ConvertError::ConverterFailed {
                input: input.to_path_buf(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_template_places_paths() {
        let converter = ExternalConverter::default();
        assert_eq!(converter.program(), "sleap-convert");
        assert_eq!(
            converter.render_args(Path::new("in/a.slp"), Path::new("out/a.csv")),
            vec!["--format", "analysis.csv", "-o", "out/a.csv", "in/a.slp"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn runs_program_with_rendered_paths() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("a.slp");
        let output = tmp.path().join("a.csv");
        std::fs::write(&input, b"tracks").unwrap();

        let converter = ExternalConverter::from_template("cp", "{input} {output}");
        converter.convert(&input, &output).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"tracks");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_reported() {
        let converter = ExternalConverter::new("false", Vec::new());
        let err = converter
            .convert(Path::new("a.slp"), Path::new("a.csv"))
            .unwrap_err();
        assert!(matches!(err, ConvertError::ConverterFailed { .. }));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let converter = ExternalConverter::new("flyscope-no-such-converter", Vec::new());
        let err = converter
            .convert(Path::new("a.slp"), Path::new("a.csv"))
            .unwrap_err();
        assert!(matches!(err, ConvertError::ConverterSpawn { .. }));
    }
}
