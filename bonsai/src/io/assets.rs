//! Skill and registry asset resolution.
//!
//! Filesystem copies override the baseline compiled into the binary. Skills
//! resolve per `<name>/<version>` directory in this order:
//!
//! 1. `<repo>/ai/skills/<name>/<version>/`
//! 2. each configured extra dir `<dir>/<name>/<version>/`
//! 3. `<user-config>/skills/<name>/<version>/`
//! 4. embedded baseline
//!
//! The registry resolves `<repo>/ai/skills.yaml`, then `<user-config>/skills.yaml`,
//! then the embedded baseline.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::registry::Registry;

pub const SKILL_FILE: &str = "SKILL.md";
pub const OUTPUT_SCHEMA_FILE: &str = "output.schema.json";
pub const REGISTRY_FILE: &str = "skills.yaml";

const EMBEDDED_REGISTRY: &str = include_str!("../../assets/skills.yaml");

struct EmbeddedSkill {
    name: &'static str,
    version: &'static str,
    skill_md: &'static str,
    output_schema: Option<&'static str>,
}

const EMBEDDED_SKILLS: &[EmbeddedSkill] = &[
    EmbeddedSkill {
        name: "repo-convention-enforcer",
        version: "v1",
        skill_md: include_str!("../../assets/skills/repo-convention-enforcer/v1/SKILL.md"),
        output_schema: Some(include_str!(
            "../../assets/skills/repo-convention-enforcer/v1/output.schema.json"
        )),
    },
    EmbeddedSkill {
        name: "patch-scope-guard",
        version: "v1",
        skill_md: include_str!("../../assets/skills/patch-scope-guard/v1/SKILL.md"),
        output_schema: None,
    },
    EmbeddedSkill {
        name: "dependency-layer-violation",
        version: "v1",
        skill_md: include_str!("../../assets/skills/dependency-layer-violation/v1/SKILL.md"),
        output_schema: None,
    },
    EmbeddedSkill {
        name: "api-surface-review",
        version: "v1",
        skill_md: include_str!("../../assets/skills/api-surface-review/v1/SKILL.md"),
        output_schema: None,
    },
    EmbeddedSkill {
        name: "structural-change-review",
        version: "v1",
        skill_md: include_str!("../../assets/skills/structural-change-review/v1/SKILL.md"),
        output_schema: None,
    },
];

/// Where an asset was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    Repo(PathBuf),
    Extra(PathBuf),
    User(PathBuf),
    Embedded,
}

impl fmt::Display for AssetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetSource::Repo(path) => write!(f, "repo-local ({})", path.display()),
            AssetSource::Extra(path) => write!(f, "extra ({})", path.display()),
            AssetSource::User(path) => write!(f, "user ({})", path.display()),
            AssetSource::Embedded => f.write_str("embedded"),
        }
    }
}

/// Raw files of one skill version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillFiles {
    pub skill_md: String,
    pub output_schema: Option<String>,
    pub source: AssetSource,
}

#[derive(Debug, Clone, Default)]
pub struct AssetResolver {
    repo_root: Option<PathBuf>,
    extra_skill_dirs: Vec<PathBuf>,
    user_config_dir: Option<PathBuf>,
}

impl AssetResolver {
    pub fn new(
        repo_root: Option<PathBuf>,
        extra_skill_dirs: Vec<PathBuf>,
        user_config_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            repo_root,
            extra_skill_dirs,
            user_config_dir,
        }
    }

    /// Resolver that only sees the embedded baseline.
    pub fn embedded_only() -> Self {
        Self::default()
    }

    /// Load and parse the highest-precedence registry document.
    #[instrument(skip_all)]
    pub fn load_registry(&self) -> Result<Registry> {
        let (contents, source) = self.read_registry()?;
        debug!(source = %source, "loading skills registry");
        let registry = Registry::parse(&contents).with_context(|| format!("registry from {source}"))?;
        for (bundle, skill) in registry.unknown_bundle_entries() {
            warn!(bundle = %bundle, skill = %skill, "bundle lists unregistered skill");
        }
        Ok(registry)
    }

    fn read_registry(&self) -> Result<(String, AssetSource)> {
        let candidates = [
            self.repo_root
                .as_ref()
                .map(|root| AssetSource::Repo(root.join("ai").join(REGISTRY_FILE))),
            self.user_config_dir
                .as_ref()
                .map(|dir| AssetSource::User(dir.join(REGISTRY_FILE))),
        ];
        for source in candidates.into_iter().flatten() {
            let path = match &source {
                AssetSource::Repo(path) | AssetSource::User(path) => path.clone(),
                _ => continue,
            };
            if path.is_file() {
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("read {}", path.display()))?;
                return Ok((contents, source));
            }
        }
        Ok((EMBEDDED_REGISTRY.to_string(), AssetSource::Embedded))
    }

    /// Resolve the files of `name` at `version`.
    pub fn resolve_skill(&self, name: &str, version: &str) -> Result<SkillFiles> {
        if let Some(dir) = self.skill_dir(name, version) {
            return read_skill_dir(dir);
        }
        EMBEDDED_SKILLS
            .iter()
            .find(|skill| skill.name == name && skill.version == version)
            .map(|skill| SkillFiles {
                skill_md: skill.skill_md.to_string(),
                output_schema: skill.output_schema.map(str::to_string),
                source: AssetSource::Embedded,
            })
            .ok_or_else(|| anyhow!("skill not found: {name}/{version}"))
    }

    fn skill_dir(&self, name: &str, version: &str) -> Option<AssetSource> {
        let relative = Path::new(name).join(version);
        let repo = self
            .repo_root
            .iter()
            .map(|root| AssetSource::Repo(root.join("ai").join("skills").join(&relative)));
        let extra = self
            .extra_skill_dirs
            .iter()
            .map(|dir| AssetSource::Extra(dir.join(&relative)));
        let user = self
            .user_config_dir
            .iter()
            .map(|dir| AssetSource::User(dir.join("skills").join(&relative)));
        repo.chain(extra).chain(user).find(|source| match source {
            AssetSource::Repo(path) | AssetSource::Extra(path) | AssetSource::User(path) => {
                path.is_dir()
            }
            AssetSource::Embedded => false,
        })
    }
}

fn read_skill_dir(source: AssetSource) -> Result<SkillFiles> {
    let dir = match &source {
        AssetSource::Repo(path) | AssetSource::Extra(path) | AssetSource::User(path) => path,
        AssetSource::Embedded => return Err(anyhow!("embedded skills have no directory")),
    };
    let skill_path = dir.join(SKILL_FILE);
    if !skill_path.is_file() {
        return Err(anyhow!("missing required file {}", skill_path.display()));
    }
    let skill_md = fs::read_to_string(&skill_path)
        .with_context(|| format!("read {}", skill_path.display()))?;
    let schema_path = dir.join(OUTPUT_SCHEMA_FILE);
    let output_schema = if schema_path.is_file() {
        Some(
            fs::read_to_string(&schema_path)
                .with_context(|| format!("read {}", schema_path.display()))?,
        )
    } else {
        None
    };
    Ok(SkillFiles {
        skill_md,
        output_schema,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::GovernanceMode;

    fn write_skill(root: &Path, name: &str, body: &str) {
        let dir = root.join(name).join("v1");
        fs::create_dir_all(&dir).expect("create skill dir");
        fs::write(dir.join(SKILL_FILE), body).expect("write skill");
    }

    #[test]
    fn embedded_registry_is_consistent() {
        let resolver = AssetResolver::embedded_only();
        let registry = resolver.load_registry().expect("registry");
        assert!(registry.unknown_bundle_entries().is_empty());
        for skill in &registry.skills {
            let version = registry.effective_version(skill);
            resolver
                .resolve_skill(&skill.name, version)
                .unwrap_or_else(|err| panic!("{}: {err:#}", skill.name));
        }
        for bundle in ["default", "patch", "full"] {
            assert!(registry.skills_for_bundle(bundle).is_ok(), "{bundle}");
        }
        for mode in GovernanceMode::ALL {
            assert!(registry.skills_for_mode(mode).is_ok(), "{mode}");
        }
    }

    #[test]
    fn repo_skill_overrides_extra_user_and_embedded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = temp.path().join("repo");
        let extra = temp.path().join("extra");
        let user = temp.path().join("user");
        write_skill(&repo.join("ai/skills"), "patch-scope-guard", "repo body");
        write_skill(&extra, "patch-scope-guard", "extra body");
        write_skill(&extra, "api-surface-review", "extra api");
        write_skill(&user.join("skills"), "api-surface-review", "user api");
        write_skill(&user.join("skills"), "structural-change-review", "user structural");

        let resolver = AssetResolver::new(Some(repo.clone()), vec![extra.clone()], Some(user.clone()));

        let files = resolver.resolve_skill("patch-scope-guard", "v1").expect("resolve");
        assert_eq!(files.skill_md, "repo body");
        assert!(matches!(files.source, AssetSource::Repo(_)));

        let files = resolver.resolve_skill("api-surface-review", "v1").expect("resolve");
        assert_eq!(files.skill_md, "extra api");

        let files = resolver
            .resolve_skill("structural-change-review", "v1")
            .expect("resolve");
        assert_eq!(files.skill_md, "user structural");

        let files = resolver
            .resolve_skill("dependency-layer-violation", "v1")
            .expect("resolve");
        assert_eq!(files.source, AssetSource::Embedded);
    }

    #[test]
    fn skill_dir_without_skill_md_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("ai/skills/patch-scope-guard/v1");
        fs::create_dir_all(&dir).expect("create dir");
        let resolver = AssetResolver::new(Some(temp.path().to_path_buf()), Vec::new(), None);
        let err = resolver.resolve_skill("patch-scope-guard", "v1").unwrap_err();
        assert!(err.to_string().contains("missing required file"));
    }

    #[test]
    fn repo_registry_overrides_embedded() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("ai")).expect("create ai");
        fs::write(
            temp.path().join("ai").join(REGISTRY_FILE),
            "registry:\n  - { name: local, run_when: { modes: [AUDIT] } }\nbundles:\n  default: [local]\n",
        )
        .expect("write registry");
        let resolver = AssetResolver::new(Some(temp.path().to_path_buf()), Vec::new(), None);
        let registry = resolver.load_registry().expect("registry");
        assert_eq!(registry.bundle_names(), vec!["default".to_string()]);
        assert!(registry.lookup("local").is_some());
    }

    #[test]
    fn unknown_skill_is_not_found() {
        let err = AssetResolver::embedded_only()
            .resolve_skill("nope", "v1")
            .unwrap_err();
        assert_eq!(err.to_string(), "skill not found: nope/v1");
    }
}
