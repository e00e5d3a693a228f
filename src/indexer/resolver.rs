// Import specifier resolution (relative paths, package `#` aliases, tsconfig `paths`)

use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// How many directories above the project root are searched for config files
const MAX_PARENT_LEVELS: usize = 2;

/// Extensions kept as written. `.js` is absent on purpose: it is rewritten to `.ts`.
const KNOWN_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "mts", "cts", "jsx", "mjs", "cjs", "json", "node", "wasm", "css", "scss", "sass",
    "less", "svg", "vue", "svelte",
];

/// Build output directories mapped back to `src` for package aliases
const BUILD_OUTPUT_DIRS: &[&str] = &["dist", "build", "out"];

/// `*`-pattern with at most one wildcard, e.g. `@app/*` or `#config`
#[derive(Debug, Clone)]
struct AliasPattern {
    prefix: String,
    suffix: Option<String>,
}

impl AliasPattern {
    fn parse(pattern: &str) -> Option<Self> {
        match pattern.matches('*').count() {
            0 => Some(Self {
                prefix: pattern.to_string(),
                suffix: None,
            }),
            1 => {
                let (prefix, suffix) = pattern.split_once('*')?;
                Some(Self {
                    prefix: prefix.to_string(),
                    suffix: Some(suffix.to_string()),
                })
            }
            _ => None,
        }
    }

    /// Anchored match; returns the text captured by `*` (empty for exact patterns)
    fn capture<'a>(&self, specifier: &'a str) -> Option<&'a str> {
        match &self.suffix {
            None => (specifier == self.prefix).then_some(""),
            Some(suffix) => {
                if specifier.len() < self.prefix.len() + suffix.len() {
                    return None;
                }
                let rest = specifier.strip_prefix(self.prefix.as_str())?;
                rest.strip_suffix(suffix.as_str())
            }
        }
    }
}

fn substitute(template: &str, capture: &str) -> String {
    template.replacen('*', capture, 1)
}

/// Resolves import specifiers to absolute paths without touching the filesystem.
///
/// Results are heuristic: extension probing picks `.ts`/`.js` by rule, so a
/// resolved path may not exist on disk.
#[derive(Debug, Clone, Default)]
pub struct ImportResolver {
    project_root: PathBuf,
    base_url: Option<PathBuf>,
    path_mappings: Vec<(AliasPattern, Vec<String>)>,
    package_imports: Vec<(AliasPattern, String)>,
}

impl ImportResolver {
    /// A resolver with no project configuration; only relative and absolute
    /// specifiers resolve.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver and load configuration for `project_root`
    pub fn load(project_root: &Path) -> Self {
        let mut resolver = Self::new();
        resolver.initialize(project_root);
        resolver
    }

    /// (Re)load `tsconfig.json` and `package.json` for a project root.
    /// Missing or corrupt files leave the corresponding rules empty.
    pub fn initialize(&mut self, project_root: &Path) {
        *self = Self {
            project_root: normalize_path(project_root),
            ..Self::default()
        };

        if let Some(tsconfig) = find_upward(&self.project_root, "tsconfig.json") {
            self.load_tsconfig(&tsconfig);
        }
        if let Some(package_json) = find_upward(&self.project_root, "package.json") {
            self.load_package_imports(&package_json);
        }

        info!(
            "Import resolver ready for {}: {} path mappings, {} package imports",
            self.project_root.display(),
            self.path_mappings.len(),
            self.package_imports.len()
        );
    }

    pub fn base_url(&self) -> Option<&Path> {
        self.base_url.as_deref()
    }

    fn load_tsconfig(&mut self, path: &Path) {
        let Some(doc) = read_json_document(path) else { return };
        let Some(options) = doc.get("compilerOptions") else { return };
        let config_dir = path.parent().unwrap_or(Path::new("/"));

        let base_url = options.get("baseUrl").and_then(Value::as_str);
        let paths = options.get("paths").and_then(Value::as_object);

        if let Some(base_url) = base_url {
            self.base_url = Some(normalize_path(&config_dir.join(base_url)));
        } else if paths.is_some() {
            self.base_url = Some(config_dir.to_path_buf());
        }

        for (pattern, targets) in paths.into_iter().flatten() {
            let Some(alias) = AliasPattern::parse(pattern) else {
                warn!("Skipping path mapping with more than one '*': {}", pattern);
                continue;
            };
            let targets: Vec<String> = targets
                .as_array()
                .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            if !targets.is_empty() {
                self.path_mappings.push((alias, targets));
            }
        }

        debug!("Loaded {} path mappings from {}", self.path_mappings.len(), path.display());
    }

    fn load_package_imports(&mut self, path: &Path) {
        let Some(doc) = read_json_document(path) else { return };
        let Some(imports) = doc.get("imports").and_then(Value::as_object) else { return };

        for (pattern, target) in imports {
            let Some(alias) = AliasPattern::parse(pattern) else {
                warn!("Skipping package import with more than one '*': {}", pattern);
                continue;
            };
            match conditional_target(target) {
                Some(target) => self.package_imports.push((alias, target.to_string())),
                None => debug!("No usable target for package import {}", pattern),
            }
        }

        debug!("Loaded {} package imports from {}", self.package_imports.len(), path.display());
    }

    /// Resolve `specifier` as written in `from_file`. `None` means external or unresolved.
    pub fn resolve_import_path(&self, specifier: &str, from_file: &str) -> Option<String> {
        let specifier = specifier.trim();
        if specifier.is_empty() {
            return None;
        }

        if specifier.starts_with('#') {
            if let Some(resolved) = self.resolve_package_import(specifier) {
                return Some(resolved);
            }
        } else if is_relative(specifier) {
            let base = Path::new(from_file).parent().unwrap_or(Path::new("/"));
            return Some(probe_extension(&normalize_path(&base.join(specifier))));
        } else if specifier.starts_with('/') {
            return Some(probe_extension(&normalize_path(Path::new(specifier))));
        }

        self.resolve_path_mapping(specifier)
    }

    fn resolve_package_import(&self, specifier: &str) -> Option<String> {
        for (pattern, target) in &self.package_imports {
            let Some(capture) = pattern.capture(specifier) else { continue };
            let target = source_dir_for_build_output(&substitute(target, capture));
            let candidate = normalize_path(&self.project_root.join(target));
            return Some(probe_extension(&candidate));
        }
        None
    }

    fn resolve_path_mapping(&self, specifier: &str) -> Option<String> {
        let base_url = self.base_url.as_ref()?;
        for (pattern, targets) in &self.path_mappings {
            let Some(capture) = pattern.capture(specifier) else { continue };
            // Without an existence check the first template always wins
            let target = targets.first()?;
            let candidate = normalize_path(&base_url.join(substitute(target, capture)));
            return Some(probe_extension(&candidate));
        }
        None
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." || specifier == ".."
}

/// Pick a string target from a package.json `imports` value, which may be a
/// plain string or a condition object.
fn conditional_target(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(conditions) => ["import", "default", "require", "node"]
            .iter()
            .find_map(|key| conditions.get(*key).and_then(conditional_target)),
        _ => None,
    }
}

/// `./dist/lib/x.js` → `src/lib/x.js`
fn source_dir_for_build_output(target: &str) -> String {
    let trimmed = target.strip_prefix("./").unwrap_or(target);
    match trimmed.split_once('/') {
        Some((first, rest)) if BUILD_OUTPUT_DIRS.contains(&first) => format!("src/{}", rest),
        _ => trimmed.to_string(),
    }
}

/// Apply the `.ts`/`.js` extension heuristic; never checks that the file exists.
pub fn probe_extension(candidate: &Path) -> String {
    let extension = candidate.extension().and_then(|e| e.to_str());

    let probed = match extension {
        Some("js") => candidate.with_extension("ts"),
        Some(ext) if KNOWN_EXTENSIONS.contains(&ext) => candidate.to_path_buf(),
        _ => {
            let suffix = if in_source_dir(candidate) { ".ts" } else { ".js" };
            let mut path = candidate.as_os_str().to_os_string();
            path.push(suffix);
            PathBuf::from(path)
        }
    };

    probed.to_string_lossy().into_owned()
}

/// A `src` directory anywhere in the candidate path
fn in_source_dir(candidate: &Path) -> bool {
    candidate.components().any(|c| c.as_os_str() == "src")
}

/// Collapse `.` and `..` lexically
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_parent = matches!(normalized.components().next_back(), Some(Component::ParentDir));
                if last_is_parent || (!normalized.pop() && !path.has_root()) {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Look for `name` in `root` and up to [`MAX_PARENT_LEVELS`] parents
fn find_upward(root: &Path, name: &str) -> Option<PathBuf> {
    root.ancestors()
        .take(MAX_PARENT_LEVELS + 1)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

fn read_json_document(path: &Path) -> Option<Value> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str(&strip_trailing_commas(&strip_json_comments(&content))) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!("Ignoring malformed {}: {}", path.display(), e);
            None
        }
    }
}

/// Remove `//` and `/* */` comments outside string literals
fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Drop commas directly followed (modulo whitespace) by `}` or `]`
fn strip_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&escaped) = chars.get(i + 1) {
                    out.push(escaped);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
            out.push(c);
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if !matches!(next, Some('}') | Some(']')) {
                out.push(c);
            }
        } else {
            out.push(c);
        }
        i += 1;
    }

    out
}
