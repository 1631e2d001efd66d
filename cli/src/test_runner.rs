use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use emboss::DirectoryResolver;
use renderer::{Config, Emboss, Value};

const TEST_SUFFIX: &str = ".test.emboss";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Data context the template is rendered against.
    #[serde(default)]
    pub data: Option<toml::Table>,

    /// Importable templates by id. Files next to the test are importable too.
    #[serde(default)]
    pub templates: BTreeMap<String, String>,

    #[serde(default = "default_strict_scoping")]
    pub strict_scoping: bool,

    /// Id the template under test is compiled as. Defaults to the file stem.
    #[serde(default)]
    pub template_id: Option<String>,

    /// Expected exact output (trimmed comparison).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// Expected error: its Display string must contain this substring.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// Expected error kind: source, structural, resolution, generation or render.
    #[serde(default)]
    pub expect_error_kind: Option<String>,
}

fn default_strict_scoping() -> bool {
    true
}

/// Parse a `.test.emboss` file into its TOML config and template source.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');

    if !content.starts_with("---") {
        return Err("missing opening --- frontmatter delimiter".into());
    }

    let after_open = &content[3..];
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let toml_str = after_open[..close_pos].trim_end_matches('\r');
    let rest = &after_open[close_pos + 4..];
    let source = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let config: TestConfig =
        toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

    Ok((config, source))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

fn run_single_test(path: &Path) -> TestResult {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            return TestResult {
                path: path.to_path_buf(),
                description: None,
                outcome: TestOutcome::Fail(format!("cannot read file: {}", e)),
            };
        }
    };

    let (config, source) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => {
            return TestResult {
                path: path.to_path_buf(),
                description: None,
                outcome: TestOutcome::Fail(format!("frontmatter error: {}", e)),
            };
        }
    };

    TestResult {
        path: path.to_path_buf(),
        description: config.description.clone(),
        outcome: match check(path, &config, source) {
            None => TestOutcome::Pass,
            Some(reason) => TestOutcome::Fail(reason),
        },
    }
}

/// Compile and render one test. Returns `Some(reason)` on mismatch.
fn check(path: &Path, config: &TestConfig, source: &str) -> Option<String> {
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let emboss = Emboss::with_config(Config {
        strict_scoping: config.strict_scoping,
        ..Config::default()
    })
    .with_resolver(DirectoryResolver::new(base_dir));
    for (id, text) in &config.templates {
        emboss.register_source(id, text.as_str());
    }

    let template_id = config.template_id.clone().unwrap_or_else(|| {
        path.file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.trim_end_matches(TEST_SUFFIX).to_string())
            .unwrap_or_default()
    });
    let data = config.data.clone().map(|table| Value::from(toml::Value::Table(table)));

    let result = emboss
        .compile(source, Some(&template_id))
        .and_then(|compiled| compiled.render(data.as_ref()));

    let expects_error = config.expect_error.is_some() || config.expect_error_kind.is_some();
    match result {
        Err(error) if expects_error => {
            if let Some(kind) = &config.expect_error_kind {
                if !error.kind.to_string().eq_ignore_ascii_case(kind) {
                    return Some(format!("expected a {} error, got: {}", kind, error));
                }
            }
            match &config.expect_error {
                Some(expected) if !error.to_string().contains(expected.as_str()) => Some(format!(
                    "expected error containing \"{}\", got: {}",
                    expected, error
                )),
                _ => None,
            }
        }
        Err(error) => Some(format!("unexpected error: {}", error)),
        Ok(_) if expects_error => Some(format!(
            "expected error {}, but rendering succeeded",
            config
                .expect_error
                .as_deref()
                .or(config.expect_error_kind.as_deref())
                .unwrap_or_default()
        )),
        Ok(actual) => match &config.expect_output {
            Some(expected) if actual.trim() != expected.trim() => Some(format!(
                "output mismatch\n  expected: {}\n  actual:   {}",
                expected.trim(),
                actual.trim()
            )),
            _ => None,
        },
    }
}

/// Discover `.test.emboss` files grouped by category (subfolder relative to
/// root). Files directly in `root` get category "".
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.ends_with(TEST_SUFFIX) {
                let category = path
                    .parent()
                    .and_then(|p| p.strip_prefix(root).ok())
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .unwrap_or_default();
                out.entry(category).or_default().push(path);
            }
        }
    }
}

pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return;
    }

    eprintln!("available categories:");
    for (cat, files) in &categories {
        let label = if cat.is_empty() { "(root)" } else { cat.as_str() };
        eprintln!("  {} ({} tests)", label, files.len());
    }
}

fn paint(text: &str, code: &str, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    }
}

fn label_of(result: &TestResult) -> String {
    result.description.clone().unwrap_or_else(|| {
        result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.trim_end_matches(TEST_SUFFIX).to_string())
            .unwrap_or_else(|| "?".to_string())
    })
}

/// Run all `.test.emboss` files under `path` (or a single file). If
/// `categories` is non-empty, only those categories run. Returns the exit
/// code: 0 when everything passed.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let run_categories: BTreeMap<String, Vec<PathBuf>> = if path.is_file() {
        BTreeMap::from([(String::new(), vec![path.to_path_buf()])])
    } else {
        let all_categories = discover_categorized(path);
        if all_categories.is_empty() {
            eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
            return 1;
        }
        if categories.is_empty() {
            all_categories
        } else {
            select(all_categories, categories)
        }
    };

    if run_categories.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (cat, files) in &run_categories {
        if !path.is_file() {
            let header = if cat.is_empty() { "(root)" } else { cat.as_str() };
            eprintln!();
            eprintln!("{}", paint(header, "1", no_color));
        }

        for file in files {
            let result = run_single_test(file);
            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", paint("PASS", "32", no_color), label_of(&result));
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", paint("FAIL", "31", no_color), label_of(&result));
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for f in &failures {
            eprintln!();
            eprintln!("  --- {} ---", f.path.display());
            if let TestOutcome::Fail(reason) = &f.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    if failures.is_empty() {
        eprintln!("test result: {}. {} passed, 0 failed", paint("ok", "32", no_color), passed);
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            paint("FAILED", "31", no_color),
            passed,
            failures.len(),
            passed + failures.len()
        );
        1
    }
}

/// Keep the requested categories and their subcategories.
fn select(
    all_categories: BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<String, Vec<PathBuf>> {
    let wanted: Vec<&str> = requested.iter().map(|r| r.trim_matches('/')).collect();
    for req in &wanted {
        let found = all_categories
            .keys()
            .any(|cat| cat == req || cat.starts_with(&format!("{}/", req)));
        if !found {
            eprintln!(
                "warning: category '{}' not found (available: {})",
                req,
                all_categories
                    .keys()
                    .map(|k| if k.is_empty() { "(root)" } else { k.as_str() })
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
    all_categories
        .into_iter()
        .filter(|(cat, _)| {
            wanted
                .iter()
                .any(|req| cat == req || cat.starts_with(&format!("{}/", req)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmatter_splits_config_and_source() {
        let content = "---\ndescription = \"hi\"\ndata = { name = \"Ada\" }\nexpect_output = \"Hi Ada\"\n---\nHi {{print name}}\n";
        let (config, source) = parse_test_file(content).unwrap();
        assert_eq!(config.description.as_deref(), Some("hi"));
        assert!(config.strict_scoping);
        assert_eq!(source, "Hi {{print name}}\n");
        assert_eq!(check(Path::new("greet.test.emboss"), &config, source), None);
    }

    #[test]
    fn missing_frontmatter_is_reported() {
        assert!(parse_test_file("Hi").is_err());
        assert!(parse_test_file("---\ndescription = 1").is_err());
    }

    #[test]
    fn error_kind_expectation() {
        let content = "---\nexpect_error_kind = \"structural\"\nexpect_error = \"No closing tag\"\n---\n{{if a}}";
        let (config, source) = parse_test_file(content).unwrap();
        assert_eq!(check(Path::new("open.test.emboss"), &config, source), None);

        let content = "---\nexpect_error_kind = \"render\"\n---\n{{if a}}";
        let (config, source) = parse_test_file(content).unwrap();
        let reason = check(Path::new("open.test.emboss"), &config, source).unwrap();
        assert!(reason.starts_with("expected a render error"), "{}", reason);
    }
}
