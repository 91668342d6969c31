use url::Url;

use super::escape::{ColorToken, FilterText};
use super::format::OutputFormat;
use super::request::JobKind;

/// Where the engine reads its input from
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    /// The workspace input file
    Upload,
    /// A remote http(s) resource
    Remote(Url),
}

/// A validated filter option value.
///
/// Expressions are only ever produced by the builder from integers and
/// fixed templates; user input reaches a filter as `Text` or `Color`.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Int(u32),
    Keyword(&'static str),
    Expr(String),
    Text(FilterText),
    Color(ColorToken),
}

impl FilterValue {
    pub fn render(&self) -> String {
        match self {
            FilterValue::Int(value) => value.to_string(),
            FilterValue::Keyword(keyword) => (*keyword).to_string(),
            FilterValue::Expr(expr) => expr.clone(),
            FilterValue::Text(text) => text.quoted(),
            FilterValue::Color(color) => color.as_str().to_string(),
        }
    }
}

/// One filter in a chain: a name plus ordered `option=value` pairs
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: &'static str,
    pub options: Vec<(&'static str, FilterValue)>,
}

impl Filter {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            options: Vec::new(),
        }
    }

    pub fn option(mut self, key: &'static str, value: FilterValue) -> Self {
        self.options.push((key, value));
        self
    }

    pub fn render(&self) -> String {
        if self.options.is_empty() {
            return self.name.to_string();
        }
        let options: Vec<String> = self
            .options
            .iter()
            .map(|(key, value)| format!("{}={}", key, value.render()))
            .collect();
        format!("{}={}", self.name, options.join(":"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Input(InputSource),
    TrimWindow { start_seconds: f64, duration_seconds: f64 },
    FilterGraph(Vec<Filter>),
    RemuxCopy,
    Encode { format: OutputFormat, copy_audio: bool },
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Input(_) => "input",
            Stage::TrimWindow { .. } => "trim_window",
            Stage::FilterGraph(_) => "filter_graph",
            Stage::RemuxCopy => "remux_copy",
            Stage::Encode { .. } => "encode",
        }
    }
}

/// Render a filter chain as a single `-vf` argument
pub fn render_chain(filters: &[Filter]) -> String {
    filters
        .iter()
        .map(Filter::render)
        .collect::<Vec<_>>()
        .join(",")
}

/// Ordered stage description for one job. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSpec {
    kind: JobKind,
    output_format: OutputFormat,
    stages: Vec<Stage>,
}

impl PipelineSpec {
    pub(super) fn new(kind: JobKind, output_format: OutputFormat, stages: Vec<Stage>) -> Self {
        Self {
            kind,
            output_format,
            stages,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn needs_upload(&self) -> bool {
        self.stages
            .iter()
            .any(|stage| matches!(stage, Stage::Input(InputSource::Upload)))
    }

    /// Stage names joined for log lines, e.g. `input>trim_window>encode`
    pub fn summary(&self) -> String {
        self.stages
            .iter()
            .map(Stage::name)
            .collect::<Vec<_>>()
            .join(">")
    }
}
