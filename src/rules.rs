use crate::*;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

/// Placeholder substituted with the input path of a conversion step.
pub const SOURCE_PLACEHOLDER: &str = "{source}";
/// Placeholder substituted with the output path of a conversion step.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// A conversion policy for one source extension.
///
/// `command` is an argv template; every argument has `{source}` and
/// `{output}` substituted before the converter is spawned. When `staging`
/// is set, the source is first converted into an intermediate file with the
/// staging extension inside a private scratch directory, and that file is
/// fed to `command` as `{source}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConversionRule {
    pub extension: String,
    pub output_extension: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub staging: Option<Staging>,
}

/// Intermediate format produced before the main conversion.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Staging {
    pub extension: String,
    pub command: Vec<String>,
}

fn check_extension(extension: &str) -> Result<()> {
    if !extension.starts_with('.') || extension.len() < 2 {
        bail!("Extension {extension:?} must start with a dot, e.g. \".flac\"");
    }
    Ok(())
}

fn check_template(extension: &str, command: &[String]) -> Result<()> {
    if command.is_empty() {
        bail!("Conversion command for {extension:?} is empty");
    }
    for placeholder in [SOURCE_PLACEHOLDER, OUTPUT_PLACEHOLDER] {
        if !command.iter().any(|arg| arg.contains(placeholder)) {
            bail!("Conversion command for {extension:?} is missing the {placeholder} placeholder");
        }
    }
    Ok(())
}

/// Substitute the placeholders of a command template.
pub fn render_template(template: &[String], source: &Path, output: &Path) -> Vec<OsString> {
    let source = source.to_string_lossy();
    let output = output.to_string_lossy();
    template
        .iter()
        .map(|arg| {
            arg.replace(SOURCE_PLACEHOLDER, &source)
                .replace(OUTPUT_PLACEHOLDER, &output)
                .into()
        })
        .collect()
}

/// Returns the part of `path` before `extension` if `path` ends with it,
/// compared case-insensitively.
fn strip_extension<'a>(path: &'a str, extension: &str) -> Option<&'a str> {
    let split = path.len().checked_sub(extension.len())?;
    let tail = path.get(split..)?;
    (tail.to_lowercase() == extension).then(|| &path[..split])
}

impl ConversionRule {
    fn normalized(mut self) -> Result<Self> {
        self.extension = self.extension.to_lowercase();
        check_extension(&self.extension)?;
        check_extension(&self.output_extension)?;
        check_template(&self.extension, &self.command)?;
        if let Some(staging) = &self.staging {
            check_extension(&staging.extension)?;
            check_template(&self.extension, &staging.command)?;
        }
        Ok(self)
    }

    /// Replace the source extension of `path` with the output extension.
    /// Returns `None` when the rule does not apply to `path`.
    pub fn rewrite(&self, path: &str) -> Option<String> {
        strip_extension(path, &self.extension).map(|stem| format!("{stem}{}", self.output_extension))
    }

    /// Path of the converted sibling of `path`.
    pub fn output_path(&self, path: &Path) -> Option<PathBuf> {
        path.to_str().and_then(|p| self.rewrite(p)).map(PathBuf::from)
    }
}

/// Ordered table of conversion rules.
///
/// Lookup is a suffix match of the lowercased path against each rule's
/// extension; the first matching rule in configuration order wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<ConversionRule>,
}

impl RuleSet {
    /// Validate and normalize the configured rules.
    pub fn new(rules: Vec<ConversionRule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(ConversionRule::normalized)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule whose extension is a suffix of `path`.
    pub fn lookup(&self, path: &str) -> Option<&ConversionRule> {
        self.rules
            .iter()
            .find(|rule| strip_extension(path, &rule.extension).is_some())
    }

    pub fn lookup_path(&self, path: &Path) -> Option<&ConversionRule> {
        path.to_str().and_then(|p| self.lookup(p))
    }

    /// Playlist-side rewrite: swap the extension if a rule applies.
    pub fn rewrite<'a>(&self, path: &'a str) -> std::borrow::Cow<'a, str> {
        match self.lookup(path).and_then(|rule| rule.rewrite(path)) {
            Some(rewritten) => rewritten.into(),
            None => path.into(),
        }
    }
}
