//! Path classification rules.
//!
//! Two independent rulesets share this module:
//!
//! - The workflow ruleset decides whether a write needs the phase gate at
//!   all (always-allowed tooling paths, protected source paths).
//! - The UI ruleset decides whether a changed file needs a dedicated UI
//!   test. It has its own inclusion patterns and exemptions, so a path can
//!   be `Protected` for the phase gate and `UiRequiresTest` for the commit
//!   gate at the same time.
//!
//! Rules are compiled once and evaluated in an explicit order: exemptions
//! and always-allowed patterns always win over inclusion patterns.

use crate::core::config::UiRuleConfig;
use regex::Regex;
use std::path::Path;

/// Category assigned to a path by one of the rulesets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    AlwaysAllowed,
    Protected,
    UiRequiresTest,
    UiTestFile,
    Exempt,
}

/// Strip the project-root prefix so rules see repo-relative paths.
pub fn relative_to_root(path: &str, root: &Path) -> String {
    let root_str = root.to_string_lossy();
    match path.strip_prefix(root_str.as_ref()) {
        Some(rest) => rest.trim_start_matches('/').to_string(),
        None => path.to_string(),
    }
}

/// Workflow ruleset: always-allowed short-circuits, then protected
/// source-file patterns, else exempt.
pub struct WorkflowRules {
    always_allowed: Vec<Regex>,
    protected: Vec<Regex>,
}

impl Default for WorkflowRules {
    fn default() -> Self {
        // Anchored at the path start, matching the legacy hook behavior.
        let always_allowed = [
            r"^\.claude/.*",
            r"^\.phasegate/.*",
            r"^\.agent-os/.*",
            r"^DOCS/.*\.md",
            r"^docs/.*\.md",
            r"^openspec/.*",
            r"^Scripts/.*",
            r".*\.xcstrings$",
            r".*\.md$",
            r".*\.txt$",
            r".*\.ya?ml$",
            r"^\.gitignore$",
            r"^\.gitattributes$",
            r"^Contents\.json$",
        ];
        let protected = [
            r".*\.swift$",
            r".*\.xcdatamodeld/.*",
            r".*\.xcodeproj/.*",
            r".*\.m$",
            r".*\.h$",
            r".*\.c$",
            r".*\.cpp$",
            r".*\.py$",
            r".*\.rs$",
            r".*\.js$",
            r".*\.tsx?$",
        ];
        WorkflowRules {
            always_allowed: compile(&always_allowed),
            protected: compile(&protected),
        }
    }
}

impl WorkflowRules {
    pub fn classify(&self, rel_path: &str) -> Category {
        if self.always_allowed.iter().any(|r| r.is_match(rel_path)) {
            return Category::AlwaysAllowed;
        }
        if self.protected.iter().any(|r| r.is_match(rel_path)) {
            return Category::Protected;
        }
        Category::Exempt
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("built-in rule pattern must compile"))
        .collect()
}

/// Test files are the permitted RED-authoring step: a `Tests/` path
/// component or a `Tests`-suffixed stem.
pub fn is_test_file(rel_path: &str) -> bool {
    if rel_path.contains("Tests/") {
        return true;
    }
    Path::new(rel_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|stem| stem.ends_with("Tests") || stem.ends_with("Test"))
}

/// UI ruleset used by the git-truth gate. Substring patterns, exemptions
/// evaluated first.
pub struct UiRules {
    patterns: Vec<String>,
    exemptions: Vec<String>,
    uitest_dir: String,
}

impl Default for UiRules {
    fn default() -> Self {
        UiRules {
            patterns: [
                "Tabs/",
                "Tracker/",
                "Views/",
                "/iOS/",
                "Calendar",
                "Settings",
                "Sheet",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exemptions: [
                "Services/",
                "Models/",
                "Engine/",
                ".md",
                "Tests/",
                "UITests/",
                "xcstrings",
                "Assets.xcassets",
                "Info.plist",
                "ContentView.swift",
                "App.swift",
                "Preview",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            uitest_dir: "UITests".to_string(),
        }
    }
}

impl UiRules {
    pub fn from_config(config: &UiRuleConfig) -> Self {
        let defaults = UiRules::default();
        UiRules {
            patterns: config.patterns.clone().unwrap_or(defaults.patterns),
            exemptions: config.exemptions.clone().unwrap_or(defaults.exemptions),
            uitest_dir: config
                .uitest_dir
                .clone()
                .unwrap_or(defaults.uitest_dir),
        }
    }

    pub fn classify(&self, rel_path: &str) -> Category {
        if self.is_ui_test_file(rel_path) {
            return Category::UiTestFile;
        }
        if self.is_ui_file(rel_path) {
            return Category::UiRequiresTest;
        }
        Category::Exempt
    }

    /// UI source file that requires a dedicated UI test.
    pub fn is_ui_file(&self, rel_path: &str) -> bool {
        if !rel_path.ends_with(".swift") {
            return false;
        }
        // Exemption always wins.
        if self.exemptions.iter().any(|e| rel_path.contains(e)) {
            return false;
        }
        self.patterns.iter().any(|p| rel_path.contains(p))
    }

    pub fn is_ui_test_file(&self, rel_path: &str) -> bool {
        rel_path.contains(&self.uitest_dir) && rel_path.ends_with(".swift")
    }

    pub fn uitest_dir(&self) -> &str {
        &self.uitest_dir
    }
}
