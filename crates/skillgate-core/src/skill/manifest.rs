//! SKILL.md manifest parsing and normalization.
//!
//! A skill definition is YAML frontmatter delimited by `---` followed by an
//! opaque markdown body. Parsing is pure: no probing, no filesystem access.

use std::collections::HashMap;

use serde::Deserialize;
use skillgate_types::error::ParseError;
use skillgate_types::skill::{
    Manifest, Necessity, Requirement, RequirementKind, SkillPayload, SkillSource,
};

/// Skill ids that collide with registry addressing and can never be used.
pub const RESERVED_SKILL_IDS: &[&str] = &["all", "none", "*", ".", ".."];

/// Extract YAML frontmatter and markdown body from a SKILL.md file.
///
/// Content must start with `---`, and a closing `\n---` separates the YAML
/// from the body. Returns `(yaml_str, body_str)` with leading newlines of the
/// body trimmed.
pub fn extract_frontmatter(content: &str) -> Result<(&str, &str), ParseError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    if !content.starts_with("---") {
        return Err(ParseError::MissingFrontmatter);
    }

    let after_open = &content[3..];
    let after_open = after_open
        .strip_prefix("\r\n")
        .or_else(|| after_open.strip_prefix('\n'))
        .unwrap_or(after_open);

    // An empty frontmatter block closes immediately.
    let (yaml_str, remainder) = if let Some(rest) = after_open.strip_prefix("---") {
        ("", rest)
    } else {
        let closing_pos = after_open
            .find("\n---")
            .ok_or(ParseError::UnclosedFrontmatter)?;
        (&after_open[..closing_pos], &after_open[closing_pos + 4..])
    };

    let body_str = remainder
        .strip_prefix("\r\n")
        .or_else(|| remainder.strip_prefix('\n'))
        .unwrap_or(remainder)
        .trim_start_matches(['\n', '\r']);

    Ok((yaml_str, body_str))
}

/// A duplicate `(kind, name)` requirement folded into an earlier declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalization {
    pub kind: RequirementKind,
    pub name: String,
    /// Position of the surviving requirement.
    pub kept_index: usize,
    /// Position of the dropped duplicate in the raw declaration list.
    pub dropped_index: usize,
    /// Necessity of the surviving requirement after the merge.
    pub necessity: Necessity,
}

/// A parsed manifest plus the normalizations applied to it.
#[derive(Debug, Clone)]
pub struct ParsedManifest {
    pub manifest: Manifest,
    pub normalizations: Vec<Normalization>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default, alias = "name")]
    skill_id: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    requirements: Vec<RawRequirement>,
    #[serde(default)]
    requires: Option<RawShorthand>,
}

#[derive(Debug, Deserialize)]
struct RawRequirement {
    kind: String,
    name: String,
    #[serde(default)]
    necessity: Option<String>,
}

/// Flat list form: `requires: { bins: [...], optional_env: [...] }`.
#[derive(Debug, Default, Deserialize)]
struct RawShorthand {
    #[serde(default)]
    bins: Vec<String>,
    #[serde(default)]
    env: Vec<String>,
    #[serde(default)]
    config: Vec<String>,
    #[serde(default)]
    python_packages: Vec<String>,
    #[serde(default)]
    optional_bins: Vec<String>,
    #[serde(default)]
    optional_env: Vec<String>,
    #[serde(default)]
    optional_config: Vec<String>,
    #[serde(default)]
    optional_python_packages: Vec<String>,
}

impl RawShorthand {
    fn into_requirements(self) -> Vec<(RequirementKind, String, Necessity)> {
        use Necessity::{Optional, Required};
        use RequirementKind::{Binary, ConfigFile, EnvironmentVariable, InterpreterPackage};

        let groups = [
            (Binary, Required, self.bins),
            (EnvironmentVariable, Required, self.env),
            (ConfigFile, Required, self.config),
            (InterpreterPackage, Required, self.python_packages),
            (Binary, Optional, self.optional_bins),
            (EnvironmentVariable, Optional, self.optional_env),
            (ConfigFile, Optional, self.optional_config),
            (InterpreterPackage, Optional, self.optional_python_packages),
        ];

        groups
            .into_iter()
            .flat_map(|(kind, necessity, names)| {
                names.into_iter().map(move |name| (kind, name, necessity))
            })
            .collect()
    }
}

/// Validate a skill id: non-empty, not reserved, slug characters only.
pub fn validate_skill_id(skill_id: &str) -> Result<(), ParseError> {
    if skill_id.is_empty() {
        return Err(ParseError::MissingSkillId);
    }

    if RESERVED_SKILL_IDS.contains(&skill_id) {
        return Err(ParseError::ReservedSkillId(skill_id.to_owned()));
    }

    let is_valid_slug = skill_id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');

    if !is_valid_slug || skill_id.starts_with('-') || skill_id.ends_with('-') {
        return Err(ParseError::InvalidSkillId(skill_id.to_owned()));
    }

    Ok(())
}

/// Parse a SKILL.md document into a normalized `Manifest`.
///
/// Explicit `requirements` entries come first, then the `requires` shorthand
/// lists. Duplicate `(kind, name)` pairs collapse onto the first declaration
/// with the stricter necessity; each collapse is reported as a
/// [`Normalization`] rather than an error.
pub fn parse_manifest(content: &str, source: SkillSource) -> Result<ParsedManifest, ParseError> {
    let (yaml_str, body_str) = extract_frontmatter(content)?;

    if yaml_str.trim().is_empty() {
        return Err(ParseError::MissingSkillId);
    }

    let raw: RawManifest = serde_yaml_ng::from_str(yaml_str)
        .map_err(|e| ParseError::Malformed(e.to_string()))?;

    let skill_id = raw.skill_id.unwrap_or_default();
    validate_skill_id(&skill_id)?;

    let mut declared: Vec<(RequirementKind, String, Necessity)> =
        Vec::with_capacity(raw.requirements.len());

    for (index, req) in raw.requirements.into_iter().enumerate() {
        let kind = RequirementKind::from_alias(&req.kind).ok_or_else(|| {
            ParseError::UnknownKind {
                index,
                kind: req.kind.clone(),
            }
        })?;
        let necessity = match req.necessity {
            Some(ref value) => Necessity::from_alias(value).ok_or_else(|| {
                ParseError::UnknownNecessity {
                    index,
                    necessity: value.clone(),
                }
            })?,
            None => Necessity::Required,
        };
        declared.push((kind, req.name, necessity));
    }

    declared.extend(raw.requires.unwrap_or_default().into_requirements());

    let (requirements, normalizations) = normalize_requirements(declared)?;

    for n in &normalizations {
        tracing::debug!(
            skill = %skill_id,
            kind = %n.kind,
            name = %n.name,
            necessity = %n.necessity,
            "Merged duplicate requirement"
        );
    }

    let manifest = Manifest {
        skill_id,
        source,
        requirements,
        payload: SkillPayload {
            description: raw.description,
            keywords: raw.keywords,
            body: body_str.to_owned(),
        },
    };

    Ok(ParsedManifest {
        manifest,
        normalizations,
    })
}

/// Collapse duplicate `(kind, name)` pairs, keeping the first position and
/// the stricter necessity.
fn normalize_requirements(
    declared: Vec<(RequirementKind, String, Necessity)>,
) -> Result<(Vec<Requirement>, Vec<Normalization>), ParseError> {
    let mut requirements: Vec<Requirement> = Vec::with_capacity(declared.len());
    let mut positions: HashMap<(RequirementKind, String), usize> = HashMap::new();
    let mut normalizations = Vec::new();

    for (index, (kind, name, necessity)) in declared.into_iter().enumerate() {
        let name = name.trim().to_owned();
        if name.is_empty() {
            return Err(ParseError::EmptyRequirementName { index });
        }

        match positions.get(&(kind, name.clone())) {
            Some(&kept_index) => {
                let kept = &mut requirements[kept_index];
                kept.necessity = kept.necessity.stricter(necessity);
                normalizations.push(Normalization {
                    kind,
                    name,
                    kept_index,
                    dropped_index: index,
                    necessity: kept.necessity,
                });
            }
            None => {
                positions.insert((kind, name.clone()), requirements.len());
                requirements.push(Requirement::new(kind, name, necessity));
            }
        }
    }

    Ok((requirements, normalizations))
}
