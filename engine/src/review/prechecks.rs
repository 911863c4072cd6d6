//! Deterministic pre-checks run before any reviewer is called

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// The artifacts of one component, as found in the workspace.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub slug: String,
    pub spec: Option<String>,
    pub style: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub rule: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// Issues and passes reported for a set of artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticFindings {
    #[serde(default)]
    pub issues: Vec<Finding>,
    #[serde(default)]
    pub passes: Vec<String>,
}

impl StaticFindings {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Static analysis collaborator.
pub trait StaticAnalyzer: Send + Sync {
    fn analyze(&self, artifacts: &Artifacts) -> StaticFindings;
}

struct Patterns {
    raw_reference: Regex,
    hex_color: Regex,
    px_length: Regex,
    class_selector: Regex,
    kebab: Regex,
}

static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();

fn patterns() -> Option<&'static Patterns> {
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                raw_reference: Regex::new(r"var\(\s*--(?:primitive|raw)-[A-Za-z0-9_-]*").ok()?,
                hex_color: Regex::new(r"#[0-9a-fA-F]{3,8}\b").ok()?,
                px_length: Regex::new(r"(-?\d*\.?\d+)px\b").ok()?,
                class_selector: Regex::new(r"\.([A-Za-z_][A-Za-z0-9_-]*)").ok()?,
                kebab: Regex::new(r"^[a-z][a-z0-9]*(?:-[a-z0-9]+)*$").ok()?,
            })
        })
        .as_ref()
}

/// Style rules applied to `style.css`.
#[derive(Debug, Default)]
pub struct StyleLinter;

impl StyleLinter {
    pub const RULES: [&'static str; 4] = [
        "raw-value-reference",
        "hardcoded-color",
        "hardcoded-length",
        "naming",
    ];

    fn lint_style(&self, slug: &str, css: &str, findings: &mut StaticFindings) {
        let Some(p) = patterns() else {
            tracing::error!("Style lint patterns failed to compile; skipping style rules");
            return;
        };

        let mut hits: Vec<(usize, String, usize)> = Vec::new();

        for (index, raw_line) in css.lines().enumerate() {
            let line_no = index + 1;
            let line = strip_comment(raw_line);

            let declarations = match line.split_once('{') {
                Some((selector, rest)) => {
                    for cap in p.class_selector.captures_iter(selector) {
                        let class = &cap[1];
                        if !p.kebab.is_match(class) {
                            hits.push((3, format!("class '.{}' is not kebab-case", class), line_no));
                        } else if class != slug && !class.starts_with(&format!("{}-", slug)) {
                            hits.push((
                                3,
                                format!("class '.{}' is not prefixed with '{}'", class, slug),
                                line_no,
                            ));
                        }
                    }
                    rest
                }
                None => line,
            };

            for declaration in declarations.split(';') {
                let Some((_, value)) = declaration.split_once(':') else {
                    continue;
                };

                if p.raw_reference.is_match(value) {
                    hits.push((
                        0,
                        "references a raw/primitive token; use a semantic token".to_string(),
                        line_no,
                    ));
                }
                if let Some(m) = p.hex_color.find(value) {
                    hits.push((1, format!("hardcoded colour {}", m.as_str()), line_no));
                }
                for cap in p.px_length.captures_iter(value) {
                    let magnitude = cap[1].parse::<f64>().map(f64::abs).unwrap_or(0.0);
                    if magnitude != 0.0 && magnitude != 1.0 {
                        hits.push((2, format!("hardcoded length {}px", &cap[1]), line_no));
                    }
                }
            }
        }

        for (rule_index, rule) in Self::RULES.iter().enumerate() {
            if !hits.iter().any(|(r, _, _)| *r == rule_index) {
                findings.passes.push(rule.to_string());
            }
        }
        findings
            .issues
            .extend(hits.into_iter().map(|(rule, message, line)| Finding {
                rule: Self::RULES[rule].to_string(),
                message,
                line: Some(line),
            }));
    }
}

impl StaticAnalyzer for StyleLinter {
    fn analyze(&self, artifacts: &Artifacts) -> StaticFindings {
        let mut findings = StaticFindings::default();

        match &artifacts.spec {
            Some(spec) if !spec.trim().is_empty() => findings.passes.push("spec-present".to_string()),
            _ => findings.issues.push(Finding {
                rule: "spec-present".to_string(),
                message: format!("components/{}/spec.md is missing or empty", artifacts.slug),
                line: None,
            }),
        }

        if let Some(style) = &artifacts.style {
            self.lint_style(&artifacts.slug, style, &mut findings);
        }

        findings
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find("/*") {
        Some(start) => &line[..start],
        None => line,
    }
}
