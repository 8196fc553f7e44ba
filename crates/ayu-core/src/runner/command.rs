//! Command-line construction for test runs launched from the dashboard.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Plugin options that are never passed through.
pub const DISABLED_OPTIONS: &[&str] = &["--cov-reset"];

/// A pytest plugin the run depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Installed in the project already; otherwise it is pulled in for the
    /// run with `--with`.
    #[serde(default)]
    pub is_installed: bool,
    /// Options appended after `pytest`; each may hold a flag and its value,
    /// e.g. `"--cov src/app"`.
    #[serde(default)]
    pub options: Vec<String>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            is_installed: false,
            options: Vec::new(),
        }
    }

    pub fn installed(mut self, is_installed: bool) -> Self {
        self.is_installed = is_installed;
        self
    }

    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }
}

/// What to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    /// Everything pytest discovers from the working directory.
    #[default]
    All,
    /// A directory or file.
    Path(PathBuf),
    /// Specific tests by id.
    NodeIds(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerCommand {
    is_tool: bool,
    plugins: Vec<Plugin>,
    selection: Selection,
    collect_only: bool,
}

impl RunnerCommand {
    /// `is_tool` means ayu itself is not a project dependency and has to be
    /// added to the run environment.
    pub fn new(is_tool: bool) -> Self {
        Self {
            is_tool,
            ..Self::default()
        }
    }

    pub fn plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn plugins(mut self, plugins: impl IntoIterator<Item = Plugin>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    pub fn select(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// Only collect (`--co`); used to refresh the tree without running.
    pub fn collect_only(mut self) -> Self {
        self.collect_only = true;
        self
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn is_collect_only(&self) -> bool {
        self.collect_only
    }

    /// Program and arguments, ready to spawn.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.head();
        match &self.selection {
            Selection::All => {}
            Selection::Path(path) => argv.push(path.to_string_lossy().into_owned()),
            Selection::NodeIds(ids) => argv.extend(ids.iter().cloned()),
        }
        argv
    }

    /// Shell-style rendering for display; test ids are double-quoted since
    /// parametrized ids may contain spaces.
    pub fn display(&self) -> String {
        let mut parts = self.head();
        match &self.selection {
            Selection::All => {}
            Selection::Path(path) => parts.push(path.to_string_lossy().into_owned()),
            Selection::NodeIds(ids) => parts.extend(ids.iter().map(|id| format!("\"{id}\""))),
        }
        parts.join(" ")
    }

    /// Everything up to the selection.
    fn head(&self) -> Vec<String> {
        let mut argv = vec![String::from("uv"), String::from("run")];
        if self.is_tool {
            argv.extend([String::from("--with"), String::from("ayu")]);
        }
        for plugin in self.plugins.iter().filter(|p| !p.is_installed) {
            argv.extend([String::from("--with"), plugin.name.clone()]);
        }
        argv.push(String::from("pytest"));

        for option in self.plugins.iter().flat_map(|p| &p.options) {
            let mut words = option.split_whitespace().peekable();
            if words.peek().is_some_and(|flag| DISABLED_OPTIONS.contains(flag)) {
                tracing::debug!(%option, "skipping disabled plugin option");
                continue;
            }
            argv.extend(words.map(String::from));
        }

        if self.collect_only {
            argv.push(String::from("--co"));
        }
        argv
    }
}

impl std::fmt::Display for RunnerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}
