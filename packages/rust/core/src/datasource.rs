//! Datasources: named input files plus the script that loads them and the
//! rules that map them into PRObs terms.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use probs_runner_engine::{FileSource, StagedTree, TreeBuilder};
use probs_runner_shared::{ProbsError, Result};

use crate::naming;

/// Loader script file name inside a datasource directory.
pub const LOAD_DATA_FILE: &str = "load_data.rdfox";

/// Rules file name inside a datasource directory.
pub const RULES_FILE: &str = "map.dlog";

/// Compression suffix that is transparent to format detection.
const COMPRESSED_SUFFIX: &str = ".gz";

// ---------------------------------------------------------------------------
// Format table
// ---------------------------------------------------------------------------

/// Triple serialisations that can be imported without a loader script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripleFormat {
    /// N-Triples, `.nt`.
    NTriples,
    /// Turtle, `.ttl`.
    Turtle,
}

/// A recognised data file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatTag {
    pub format: TripleFormat,
    pub compressed: bool,
}

/// Suffix → format. Anything not listed needs an explicit loader script.
const AUTO_FORMATS: &[(&str, TripleFormat)] = &[
    (".nt", TripleFormat::NTriples),
    (".ttl", TripleFormat::Turtle),
];

impl FormatTag {
    /// Detect the format of `file_name`, or return the offending suffix.
    pub fn detect(file_name: &str) -> std::result::Result<Self, String> {
        let (stem, compressed) = match file_name.strip_suffix(COMPRESSED_SUFFIX) {
            Some(stem) => (stem, true),
            None => (file_name, false),
        };
        let suffix = Path::new(stem)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        AUTO_FORMATS
            .iter()
            .find(|(known, _)| *known == suffix)
            .map(|&(_, format)| Self { format, compressed })
            .ok_or(suffix)
    }

    /// Import statement for a file staged under the datasource directory.
    ///
    /// `$(dir.facts)` is `data/` in the PRObs scripts while
    /// `$(dir.datasource)` already includes it, hence the `../`.
    pub fn import_line(&self, file_name: &str) -> String {
        match self.format {
            TripleFormat::NTriples | TripleFormat::Turtle => {
                format!("import \"../$(dir.datasource)/{file_name}\"")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// The files making up a datasource.
#[derive(Debug, Clone)]
pub enum InputFiles {
    /// Explicit staged file name → source.
    Named(Vec<(String, FileSource)>),
    /// Paths staged under their own base names.
    Paths(Vec<PathBuf>),
}

/// Script or rules text, given literally or read from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextSource {
    Text(String),
    File(PathBuf),
}

impl TextSource {
    pub fn read(&self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::File(path) => std::fs::read_to_string(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ProbsError::NotFound { path: path.clone() },
                _ => ProbsError::io(path, e),
            }),
        }
    }
}

impl From<&str> for TextSource {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<PathBuf> for TextSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

/// Read and newline-join every part.
fn join_texts(parts: &[TextSource]) -> Result<String> {
    let texts = parts.iter().map(TextSource::read).collect::<Result<Vec<_>>>()?;
    Ok(texts.join("\n"))
}

// ---------------------------------------------------------------------------
// Datasource
// ---------------------------------------------------------------------------

/// One unit of input to the conversion stage. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datasource {
    files: StagedTree,
    load_data_script: String,
    rules: String,
}

impl Datasource {
    /// A datasource holding literal fact text, staged as `data/<hash>.ttl`.
    pub fn from_facts(facts: &str) -> Result<Self> {
        let file_name = naming::facts_file_name(facts);
        let mut builder = TreeBuilder::new();
        builder.insert(
            format!("data/{file_name}"),
            FileSource::labelled(format!("facts {file_name}"), facts.as_bytes()),
        )?;
        Ok(Self {
            files: builder.build(),
            load_data_script: format!("import \"{file_name}\"\n"),
            rules: String::new(),
        })
    }

    /// A datasource from files, staged under `data/<name>/` where `<name>`
    /// is derived from the sources.
    ///
    /// Without a loader script, `.nt`/`.ttl` files (optionally `.gz`) get
    /// one generated import each; any other suffix is an error.
    #[instrument(skip_all)]
    pub fn from_files(
        inputs: InputFiles,
        load_data_script: Option<&[TextSource]>,
        rules: Option<&[TextSource]>,
    ) -> Result<Self> {
        let entries = match inputs {
            InputFiles::Named(entries) => entries,
            InputFiles::Paths(paths) => name_paths(paths)?,
        };
        for (_, source) in &entries {
            if let FileSource::Path(path) = source {
                if !path.exists() {
                    return Err(ProbsError::NotFound { path: path.clone() });
                }
            }
        }

        let name = naming::datasource_name(entries.iter().map(|(_, source)| source));
        let file_names: Vec<String> = entries.iter().map(|(file, _)| file.clone()).collect();

        let mut builder = TreeBuilder::new();
        for (file, source) in entries {
            builder.insert(format!("data/{name}/{file}"), source)?;
        }

        let loader = match load_data_script {
            Some(parts) => join_texts(parts)?,
            None => auto_loader(&file_names)?,
        };
        let rules = rules.map(join_texts).transpose()?.unwrap_or_default();

        debug!(%name, files = file_names.len(), "datasource built");
        Ok(Self {
            files: builder.build(),
            load_data_script: format!("set dir.datasource \"$(dir.root)/data/{name}/\"\n{loader}"),
            rules,
        })
    }

    /// Staged relative path → source.
    pub fn files(&self) -> &StagedTree {
        &self.files
    }

    /// RDFox commands that import the staged files, run from the
    /// conversion stage's `load_data.rdfox`.
    pub fn load_data_script(&self) -> &str {
        &self.load_data_script
    }

    /// Datalog rules mapping the imported data into PRObs terms; empty when
    /// the datasource brings none.
    pub fn rules(&self) -> &str {
        &self.rules
    }
}

/// Name each path by its base name, rejecting duplicates.
fn name_paths(paths: Vec<PathBuf>) -> Result<Vec<(String, FileSource)>> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .map(|path| {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| {
                    ProbsError::invalid_input(format!("{} has no usable file name", path.display()))
                })?
                .to_string();
            if !seen.insert(name.clone()) {
                return Err(ProbsError::DuplicateName { name });
            }
            Ok((name, FileSource::Path(path)))
        })
        .collect()
}

/// Generate a loader for triple files, or name the suffixes that block it.
fn auto_loader(file_names: &[String]) -> Result<String> {
    let mut unsupported = BTreeSet::new();
    let mut lines = vec!["# Auto generated to load TTL files".to_string()];
    for file in file_names {
        match FormatTag::detect(file) {
            Ok(tag) => lines.push(tag.import_line(file)),
            Err(suffix) => {
                unsupported.insert(suffix);
            }
        }
    }
    if !unsupported.is_empty() {
        return Err(ProbsError::UnsupportedFormats {
            suffixes: unsupported.into_iter().collect(),
        });
    }
    Ok(lines.join("\n"))
}

// ---------------------------------------------------------------------------
// Loading by convention
// ---------------------------------------------------------------------------

/// Load a datasource from `path`.
///
/// - A directory supplies optional `load_data.rdfox` and `map.dlog` files,
///   and its `*.csv` then `*.ttl` files as data.
/// - A `.dlog` file is a rules-only datasource.
/// - Any other file is a one-file datasource with a generated loader.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_datasource(path: &Path) -> Result<Datasource> {
    if path.is_dir() {
        let load_data = path.join(LOAD_DATA_FILE);
        let rules = path.join(RULES_FILE);
        let load_data = load_data.is_file().then(|| vec![TextSource::File(load_data)]);
        let rules = rules.is_file().then(|| vec![TextSource::File(rules)]);

        let mut data_files = files_with_extension(path, "csv")?;
        data_files.extend(files_with_extension(path, "ttl")?);

        Datasource::from_files(
            InputFiles::Paths(data_files),
            load_data.as_deref(),
            rules.as_deref(),
        )
    } else if path.exists() {
        let is_rules = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dlog"));
        if is_rules {
            Datasource::from_files(
                InputFiles::Paths(Vec::new()),
                None,
                Some(&[TextSource::File(path.to_path_buf())]),
            )
        } else {
            Datasource::from_files(InputFiles::Paths(vec![path.to_path_buf()]), None, None)
        }
    } else {
        Err(ProbsError::NotFound {
            path: path.to_path_buf(),
        })
    }
}

/// Regular files directly inside `dir` with extension `ext`, sorted.
fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ProbsError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ProbsError::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|found| found == ext) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
