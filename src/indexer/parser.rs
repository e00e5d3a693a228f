// Line-pattern extraction of symbols, routes and imports from TypeScript/JavaScript
//
// Each line is checked independently against the rule table below. This is a
// deliberate trade: multi-line declarations and braces inside multi-line
// strings are not understood.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;

use super::discovery::is_extractable;
use super::resolver::ImportResolver;
use crate::index::{
    DependencyEdge, DependencyKind, HttpMethod, Parameter, RouteRecord, SymbolKind, SymbolRecord, Visibility,
};

const IDENT: &str = r"[A-Za-z_$][\w$]*";

fn rule(pattern: &str) -> Regex {
    Regex::new(&pattern.replace("{IDENT}", IDENT)).expect("extraction rule must compile")
}

static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| rule(r#"^\s*import\s+(?:type\s+)?(?:[\w$*{},\s]+?\s+from\s+)?['"]([^'"]+)['"]"#));
static REEXPORT_RE: Lazy<Regex> =
    Lazy::new(|| rule(r#"^\s*export\s+(?:type\s+)?(?:\*(?:\s+as\s+{IDENT})?|\{[^}]*\})\s*from\s+['"]([^'"]+)['"]"#));
static IMPORT_TAIL_RE: Lazy<Regex> = Lazy::new(|| rule(r#"^\s*\}\s*from\s+['"]([^'"]+)['"]"#));
static REQUIRE_RE: Lazy<Regex> = Lazy::new(|| rule(r#"\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#));

static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    rule(r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(async\s+)?function\b\s*\*?\s*({IDENT})\s*(?:<.*?>)?\s*\(")
});
static ARROW_RE: Lazy<Regex> = Lazy::new(|| {
    rule(r"^\s*(?:export\s+)?(?:const|let|var)\s+({IDENT})\s*(?::[^=]+)?=\s*(async\s+)?(?:<.*?>\s*)?(?:\(|({IDENT})\s*=>)")
});
static ARROW_TAIL_RE: Lazy<Regex> = Lazy::new(|| rule(r"^\s*(?::\s*(.+?))?\s*=>"));
static CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    rule(r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?class\s+({IDENT})")
});
static CLASS_HERITAGE_RE: Lazy<Regex> =
    Lazy::new(|| rule(r"^\s*(?:extends\s+([\w$.]+)(?:<.*?>)?)?\s*(?:implements\s+([^{]+))?"));
static INTERFACE_RE: Lazy<Regex> =
    Lazy::new(|| rule(r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?interface\s+({IDENT})"));
static INTERFACE_EXTENDS_RE: Lazy<Regex> = Lazy::new(|| rule(r"^\s*extends\s+([^{]+)"));
static TYPE_RE: Lazy<Regex> =
    Lazy::new(|| rule(r"^\s*(?:export\s+)?(?:declare\s+)?type\s+({IDENT})\s*(?:<.*?>)?\s*="));
static ENUM_RE: Lazy<Regex> =
    Lazy::new(|| rule(r"^\s*(?:export\s+)?(?:declare\s+)?(?:const\s+)?enum\s+({IDENT})"));
static METHOD_RE: Lazy<Regex> = Lazy::new(|| {
    rule(r"^\s*((?:(?:public|private|protected|static|async|abstract|override|readonly)\s+)*)(?:(?:get|set)\s+)?\*?\s*(#?{IDENT})\s*\??\s*(?:<.*?>)?\s*\(")
});
static FUNCTION_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| rule(r"\bfunction\b"));

static ROUTE_CALL_RE: Lazy<Regex> =
    Lazy::new(|| rule(r#"\.(get|post|put|delete|patch|head|options)\s*\(\s*['"`]([^'"`]*)['"`]\s*,"#));
static ROUTE_DECORATOR_RE: Lazy<Regex> =
    Lazy::new(|| rule(r#"(?i)@(get|post|put|delete|patch|head|options)\s*\(\s*['"`]([^'"`]*)['"`]\s*\)"#));
static ROUTE_HANDLER_RE: Lazy<Regex> = Lazy::new(|| rule(r",\s*([A-Za-z_$][\w$.]*)\s*\)\s*;?\s*$"));

static PARAM_DECORATOR_RE: Lazy<Regex> = Lazy::new(|| rule(r"^@[\w$.]+(?:\([^)]*\))?\s*"));

/// Words that look like method names on a class-body line but never are
const NON_METHOD_WORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "function", "new", "typeof", "await", "yield", "super",
    "this", "with", "do", "else", "throw", "delete", "void", "import",
];

const PARAMETER_MODIFIERS: &[&str] = &["public ", "private ", "protected ", "readonly ", "override "];

/// Everything extracted from one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub symbols: Vec<SymbolRecord>,
    pub routes: Vec<RouteRecord>,
    pub dependencies: Vec<DependencyEdge>,
}

/// TypeScript/JavaScript extractor backed by an [`ImportResolver`]
#[derive(Debug, Clone)]
pub struct TypeScriptParser {
    resolver: Arc<ImportResolver>,
}

impl TypeScriptParser {
    pub fn new(resolver: Arc<ImportResolver>) -> Self {
        Self { resolver }
    }

    pub fn can_parse(&self, file_path: &str) -> bool {
        is_extractable(Path::new(file_path))
    }

    pub fn parse(&self, content: &str, file_path: &str) -> Extraction {
        let mut extraction = Extraction::default();
        let mut braces = BraceTracker::default();

        for (index, line) in content.lines().enumerate() {
            let line_num = index + 1;
            let trimmed = line.trim_start();
            if trimmed.starts_with("//") || trimmed.starts_with('*') || trimmed.starts_with("/*") {
                continue;
            }
            let column = line.len() - trimmed.len() + 1;
            let signature = line.trim();

            self.extract_imports(line, file_path, line_num, &mut extraction.dependencies);

            let declared_before = extraction.symbols.len();
            let mut entered_class = false;
            if let Some(symbol) = extract_function(line, file_path, line_num, column, signature) {
                extraction.symbols.push(symbol);
            }
            if let Some(symbol) = extract_arrow_function(line, file_path, line_num, column, signature) {
                extraction.symbols.push(symbol);
            }
            if let Some(symbol) = extract_class(line, file_path, line_num, column, signature) {
                braces.drop_unopened_class();
                braces.enter_class();
                entered_class = true;
                extraction.symbols.push(symbol);
            }
            if let Some(symbol) = extract_interface(line, file_path, line_num, column, signature) {
                extraction.symbols.push(symbol);
            }
            if let Some(caps) = TYPE_RE.captures(line) {
                extraction
                    .symbols
                    .push(SymbolRecord::new(&caps[1], SymbolKind::Type, file_path, line_num, column, signature));
            }
            if let Some(caps) = ENUM_RE.captures(line) {
                extraction
                    .symbols
                    .push(SymbolRecord::new(&caps[1], SymbolKind::Enum, file_path, line_num, column, signature));
            }
            if !entered_class && extraction.symbols.len() > declared_before {
                braces.drop_unopened_class();
            }
            if braces.in_class_body() && !FUNCTION_KEYWORD_RE.is_match(line) {
                if let Some(symbol) = extract_method(line, file_path, line_num, column, signature) {
                    extraction.symbols.push(symbol);
                }
            }

            extract_routes(line, file_path, line_num, &mut extraction.routes);
            braces.update(line);
        }

        extraction
    }

    fn extract_imports(&self, line: &str, file_path: &str, line_num: usize, edges: &mut Vec<DependencyEdge>) {
        let statement = IMPORT_RE
            .captures(line)
            .or_else(|| REEXPORT_RE.captures(line))
            .or_else(|| IMPORT_TAIL_RE.captures(line));

        let specifiers = statement
            .into_iter()
            .chain(REQUIRE_RE.captures_iter(line))
            .map(|caps| caps[1].to_string());

        for specifier in specifiers {
            let resolved_to = self.resolver.resolve_import_path(&specifier, file_path);
            edges.push(DependencyEdge {
                from: file_path.to_string(),
                to: specifier,
                resolved_to,
                kind: DependencyKind::Import,
                file_path: file_path.to_string(),
                line: line_num,
            });
        }
    }
}

fn extract_function(line: &str, file_path: &str, line_num: usize, column: usize, signature: &str) -> Option<SymbolRecord> {
    let caps = FUNCTION_RE.captures(line)?;
    let open = caps.get(0)?.end();
    let (params, tail) = split_parameter_list(&line[open..]);

    let mut symbol = SymbolRecord::new(&caps[2], SymbolKind::Function, file_path, line_num, column, signature);
    symbol.parameters = Some(parse_parameters(params));
    symbol.return_type = tail.and_then(|t| split_return_type(t).0).map(str::to_string);
    symbol.is_async = Some(caps.get(1).is_some());
    Some(symbol)
}

fn extract_arrow_function(
    line: &str,
    file_path: &str,
    line_num: usize,
    column: usize,
    signature: &str,
) -> Option<SymbolRecord> {
    let caps = ARROW_RE.captures(line)?;

    let (params, return_type) = match caps.get(3) {
        Some(single) => (single.as_str().to_string(), None),
        None => {
            let open = caps.get(0)?.end();
            let (params, tail) = split_parameter_list(&line[open..]);
            let tail_caps = ARROW_TAIL_RE.captures(tail?)?;
            (params.to_string(), tail_caps.get(1).map(|m| m.as_str().trim().to_string()))
        }
    };

    let mut symbol = SymbolRecord::new(&caps[1], SymbolKind::Function, file_path, line_num, column, signature);
    symbol.parameters = Some(parse_parameters(&params));
    symbol.return_type = return_type;
    symbol.is_async = Some(caps.get(2).is_some());
    Some(symbol)
}

fn extract_class(line: &str, file_path: &str, line_num: usize, column: usize, signature: &str) -> Option<SymbolRecord> {
    let caps = CLASS_RE.captures(line)?;
    let rest = skip_type_parameters(&line[caps.get(0)?.end()..]);

    let mut symbol = SymbolRecord::new(&caps[1], SymbolKind::Class, file_path, line_num, column, signature);
    if let Some(heritage) = CLASS_HERITAGE_RE.captures(rest) {
        symbol.extends = heritage.get(1).map(|m| m.as_str().to_string());
        symbol.implements = heritage.get(2).map(|m| {
            split_top_level(m.as_str(), ',')
                .into_iter()
                .map(|name| skip_generic_suffix(name.trim()).to_string())
                .filter(|name| !name.is_empty())
                .collect()
        });
    }
    Some(symbol)
}

fn extract_interface(line: &str, file_path: &str, line_num: usize, column: usize, signature: &str) -> Option<SymbolRecord> {
    let caps = INTERFACE_RE.captures(line)?;
    let rest = skip_type_parameters(&line[caps.get(0)?.end()..]);

    let mut symbol = SymbolRecord::new(&caps[1], SymbolKind::Interface, file_path, line_num, column, signature);
    symbol.extends = INTERFACE_EXTENDS_RE
        .captures(rest)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty());
    Some(symbol)
}

fn extract_method(line: &str, file_path: &str, line_num: usize, column: usize, signature: &str) -> Option<SymbolRecord> {
    let caps = METHOD_RE.captures(line)?;
    let name = caps.get(2)?.as_str();
    if NON_METHOD_WORDS.contains(&name) {
        return None;
    }

    let open = caps.get(0)?.end();
    let (params, tail) = split_parameter_list(&line[open..]);
    let return_type = match tail {
        Some(tail) => {
            let (return_type, rest) = split_return_type(tail);
            let rest = rest.trim();
            if !(rest.is_empty() || rest.starts_with('{') || rest.starts_with(';')) {
                return None;
            }
            return_type.map(str::to_string)
        }
        None => None,
    };

    let modifiers: Vec<&str> = caps.get(1).map(|m| m.as_str().split_whitespace().collect()).unwrap_or_default();
    let visibility = if name.starts_with('#') || modifiers.contains(&"private") {
        Visibility::Private
    } else if modifiers.contains(&"protected") {
        Visibility::Protected
    } else {
        Visibility::Public
    };

    let mut symbol = SymbolRecord::new(name, SymbolKind::Method, file_path, line_num, column, signature);
    symbol.parameters = Some(parse_parameters(params));
    symbol.return_type = return_type;
    symbol.visibility = Some(visibility);
    symbol.is_static = Some(modifiers.contains(&"static"));
    symbol.is_async = Some(modifiers.contains(&"async"));
    Some(symbol)
}

fn extract_routes(line: &str, file_path: &str, line_num: usize, routes: &mut Vec<RouteRecord>) {
    for caps in ROUTE_CALL_RE.captures_iter(line) {
        let Ok(method) = caps[1].parse::<HttpMethod>() else { continue };
        routes.push(RouteRecord {
            path: caps[2].to_string(),
            method,
            file_path: file_path.to_string(),
            line: line_num,
            handler: ROUTE_HANDLER_RE.captures(line).map(|c| c[1].to_string()),
            middleware: None,
        });
    }

    for caps in ROUTE_DECORATOR_RE.captures_iter(line) {
        let Ok(method) = caps[1].parse::<HttpMethod>() else { continue };
        routes.push(RouteRecord {
            path: caps[2].to_string(),
            method,
            file_path: file_path.to_string(),
            line: line_num,
            handler: None,
            middleware: None,
        });
    }
}

/// Split `a, b) rest` at the matching `)`. The tail is `None` when the list
/// does not close on this line.
fn split_parameter_list(after_open: &str) -> (&str, Option<&str>) {
    let mut depth = 0usize;
    for (i, c) in after_open.char_indices() {
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' if depth == 0 => return (&after_open[..i], Some(&after_open[i + 1..])),
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '>' if i > 0 && after_open[..i].ends_with('=') => {}
            '>' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    (after_open, None)
}

/// Split the text after a parameter list's `)` into its `: Type` annotation
/// and the rest (body `{`, `;` or whatever follows). Braces that open an
/// object type do not end the annotation.
fn split_return_type(tail: &str) -> (Option<&str>, &str) {
    let Some(annotation) = tail.trim_start().strip_prefix(':') else {
        return (None, tail);
    };

    let mut depth = 0usize;
    let mut prev = '\0';
    let mut end = annotation.len();
    for (i, c) in annotation.char_indices() {
        match c {
            '{' if depth == 0 && !awaits_type(&annotation[..i]) => {
                end = i;
                break;
            }
            ';' if depth == 0 => {
                end = i;
                break;
            }
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '>' if prev != '=' => depth = depth.saturating_sub(1),
            _ => {}
        }
        prev = c;
    }

    let return_type = annotation[..end].trim();
    ((!return_type.is_empty()).then_some(return_type), &annotation[end..])
}

/// True when a type expression still needs an operand, so a `{` starts an object type
fn awaits_type(prefix: &str) -> bool {
    let prefix = prefix.trim_end();
    prefix.is_empty() || prefix.ends_with("=>") || prefix.ends_with(&['|', '&', '<', ',', ':', '('][..])
}

/// Skip a leading `<...>` type parameter list, if any
fn skip_type_parameters(rest: &str) -> &str {
    let trimmed = rest.trim_start();
    if !trimmed.starts_with('<') {
        return rest;
    }
    let mut depth = 0usize;
    for (i, c) in trimmed.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth == 0 {
                    return &trimmed[i + 1..];
                }
            }
            _ => {}
        }
    }
    ""
}

fn skip_generic_suffix(name: &str) -> &str {
    name.split('<').next().unwrap_or(name).trim()
}

/// Split on `separator` outside of `()`, `[]`, `{}` and `<>`
fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut prev = '\0';

    for (i, c) in input.char_indices() {
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '>' if prev != '=' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
        prev = c;
    }
    parts.push(&input[start..]);
    parts
}

/// Parse a raw parameter list such as `path: string, opts?: Options = {}`
pub fn parse_parameters(params: &str) -> Vec<Parameter> {
    split_top_level(params, ',')
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(parse_parameter)
        .collect()
}

fn parse_parameter(raw: &str) -> Parameter {
    let mut text = PARAM_DECORATOR_RE.replace(raw.trim(), "").into_owned();
    while let Some(stripped) = PARAMETER_MODIFIERS.iter().find_map(|m| text.strip_prefix(m)) {
        text = stripped.trim_start().to_string();
    }

    let (declaration, default_value) = match find_default_assignment(&text) {
        Some(i) => (text[..i].trim(), Some(text[i + 1..].trim().to_string())),
        None => (text.trim(), None),
    };

    let (name_part, type_part) = match split_top_level(declaration, ':').as_slice() {
        [name, ty, ..] if !ty.trim().is_empty() => {
            let offset = name.len() + 1;
            (name.trim(), Some(declaration[offset..].trim().to_string()))
        }
        _ => (declaration, None),
    };

    let name_part = name_part.trim_start_matches("...");
    let (name, optional) = match name_part.strip_suffix('?') {
        Some(name) => (name.trim(), true),
        None => (name_part.trim(), false),
    };

    Parameter {
        name: name.to_string(),
        type_: type_part,
        optional: optional.then_some(true),
        default_value,
    }
}

/// Index of a top-level `=` that starts a default value (not `=>`, `==`, `<=`, ...)
fn find_default_assignment(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' | b'[' | b'{' | b'<' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b'>' if i > 0 && bytes[i - 1] != b'=' => depth = depth.saturating_sub(1),
            b'=' if depth == 0 => {
                let next = bytes.get(i + 1).copied();
                let prev = if i > 0 { bytes[i - 1] } else { b' ' };
                if next != Some(b'>') && next != Some(b'=') && !matches!(prev, b'=' | b'!' | b'<' | b'>') {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, Copy)]
struct ClassBody {
    depth: usize,
    opened: bool,
}

/// Line-level brace counter that knows when the current line sits directly
/// inside a class body.
#[derive(Debug, Default)]
struct BraceTracker {
    depth: usize,
    class_bodies: Vec<ClassBody>,
}

impl BraceTracker {
    fn enter_class(&mut self) {
        self.class_bodies.push(ClassBody {
            depth: self.depth + 1,
            opened: false,
        });
    }

    /// Forget a class whose body never opened, such as `declare class Foo;`
    fn drop_unopened_class(&mut self) {
        if matches!(self.class_bodies.last(), Some(body) if !body.opened) {
            self.class_bodies.pop();
        }
    }

    fn in_class_body(&self) -> bool {
        matches!(self.class_bodies.last(), Some(body) if body.opened && body.depth == self.depth)
    }

    fn update(&mut self, line: &str) {
        let (opens, closes) = count_braces(line);
        if opens == 0 && line.trim_end().ends_with(';') {
            self.drop_unopened_class();
        }
        self.depth = (self.depth + opens).saturating_sub(closes);

        while let Some(body) = self.class_bodies.last_mut() {
            if self.depth >= body.depth {
                body.opened = true;
                break;
            }
            if body.opened || opens > 0 {
                self.class_bodies.pop();
            } else {
                break;
            }
        }
    }
}

/// Count `{` and `}` outside string literals and line comments
fn count_braces(line: &str) -> (usize, usize) {
    let mut opens = 0;
    let mut closes = 0;
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == '\\' {
                chars.next();
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '/' if chars.peek() == Some(&'/') => break,
            '{' => opens += 1,
            '}' => closes += 1,
            _ => {}
        }
    }

    (opens, closes)
}
