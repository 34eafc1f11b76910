//! Fluent builders producing screenplay YAML documents for tests.
//!
//! Tests feed the built text through the real loader, so fixtures exercise
//! the same parse/interpolate/validate path as production input.
//!
//! # Example
//!
//! ```ignore
//! let yaml = ScreenplayBuilder::new("demo")
//!     .scenario("first", "interactive", |scene| {
//!         scene
//!             .action(ActionBuilder::command("echo hello"))
//!             .action(ActionBuilder::wait_for("hello").wait_mode("screen"))
//!     })
//!     .build();
//! ```

use std::fmt::Write as _;

/// Builder for one action mapping.
#[derive(Clone, Debug, Default)]
pub struct ActionBuilder {
    fields: Vec<(String, String)>,
}

fn yaml_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

impl ActionBuilder {
    #[must_use]
    pub fn command(text: &str) -> Self {
        Self::default().field("command", &yaml_quote(text))
    }

    #[must_use]
    pub fn input(text: &str) -> Self {
        Self::default().field("input", &yaml_quote(text))
    }

    #[must_use]
    pub fn key(token: &str) -> Self {
        Self::default().field("key", &yaml_quote(token))
    }

    #[must_use]
    pub fn hotkey(token: &str) -> Self {
        Self::default().field("hotkey", &yaml_quote(token))
    }

    #[must_use]
    pub fn sleep(duration: &str) -> Self {
        Self::default().field("sleep", &yaml_quote(duration))
    }

    #[must_use]
    pub fn wait_stable(duration: &str) -> Self {
        Self::default().field("wait_stable", &yaml_quote(duration))
    }

    #[must_use]
    pub fn wait_for(target: &str) -> Self {
        Self::default().field("wait_for", &yaml_quote(target))
    }

    #[must_use]
    pub fn wait_screen_regex(pattern: &str) -> Self {
        Self::default().field("wait_screen_regex", &yaml_quote(pattern))
    }

    #[must_use]
    pub fn assert_screen_regex(pattern: &str) -> Self {
        Self::default().field("assert_screen_regex", &yaml_quote(pattern))
    }

    #[must_use]
    pub fn assert_not_screen_regex(pattern: &str) -> Self {
        Self::default().field("assert_not_screen_regex", &yaml_quote(pattern))
    }

    #[must_use]
    pub fn expect_exit_code(code: i32) -> Self {
        Self::default().field("expect_exit_code", &code.to_string())
    }

    /// Append an arbitrary field (value must already be YAML-encoded).
    #[must_use]
    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.fields.push((key.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn wait_mode(self, mode: &str) -> Self {
        self.field("wait_mode", &yaml_quote(mode))
    }

    #[must_use]
    pub fn wait_timeout(self, duration: &str) -> Self {
        self.field("wait_timeout", &yaml_quote(duration))
    }

    #[must_use]
    pub fn timeout(self, duration: &str) -> Self {
        self.field("timeout", &yaml_quote(duration))
    }

    #[must_use]
    pub fn retries(self, retries: u32) -> Self {
        self.field("retries", &retries.to_string())
    }

    fn render(&self, out: &mut String) {
        let mut first = true;
        for (key, value) in &self.fields {
            if first {
                let _ = writeln!(out, "      - {key}: {value}");
                first = false;
            } else {
                let _ = writeln!(out, "        {key}: {value}");
            }
        }
    }
}

/// Builder for one scenario.
#[derive(Clone, Debug)]
pub struct SceneBuilder {
    label: String,
    execution_mode: String,
    setup: Vec<String>,
    actions: Vec<ActionBuilder>,
    agent_prompts: Vec<(String, String)>,
}

impl SceneBuilder {
    #[must_use]
    pub fn action(mut self, action: ActionBuilder) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn setup(mut self, command: &str) -> Self {
        self.setup.push(command.to_string());
        self
    }

    /// Add a prompt-policy field (value must already be YAML-encoded).
    #[must_use]
    pub fn agent_prompt_field(mut self, key: &str, value: &str) -> Self {
        self.agent_prompts.push((key.to_string(), value.to_string()));
        self
    }
}

/// Builder for a whole screenplay document.
#[derive(Clone, Debug)]
pub struct ScreenplayBuilder {
    title: String,
    output: String,
    variables: Vec<(String, String)>,
    preinstall: Vec<String>,
    scenarios: Vec<SceneBuilder>,
}

impl ScreenplayBuilder {
    #[must_use]
    pub fn new(output: &str) -> Self {
        Self {
            title: format!("{output} demo"),
            output: output.to_string(),
            variables: Vec::new(),
            preinstall: Vec::new(),
            scenarios: Vec::new(),
        }
    }

    #[must_use]
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// Declare a variable (value must already be YAML-encoded).
    #[must_use]
    pub fn variable(mut self, name: &str, value: &str) -> Self {
        self.variables.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn preinstall(mut self, command: &str) -> Self {
        self.preinstall.push(command.to_string());
        self
    }

    #[must_use]
    pub fn scenario(
        mut self,
        label: &str,
        execution_mode: &str,
        configure: impl FnOnce(SceneBuilder) -> SceneBuilder,
    ) -> Self {
        let scene = configure(SceneBuilder {
            label: label.to_string(),
            execution_mode: execution_mode.to_string(),
            setup: Vec::new(),
            actions: Vec::new(),
            agent_prompts: Vec::new(),
        });
        self.scenarios.push(scene);
        self
    }

    #[must_use]
    pub fn build(self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "title: {}", yaml_quote(&self.title));
        let _ = writeln!(out, "output: {}", yaml_quote(&self.output));
        if !self.variables.is_empty() {
            let _ = writeln!(out, "variables:");
            for (name, value) in &self.variables {
                let _ = writeln!(out, "  {name}: {value}");
            }
        }
        if !self.preinstall.is_empty() {
            let _ = writeln!(out, "preinstall:");
            for command in &self.preinstall {
                let _ = writeln!(out, "  - {}", yaml_quote(command));
            }
        }
        let _ = writeln!(out, "scenarios:");
        for scene in &self.scenarios {
            let _ = writeln!(out, "  - label: {}", yaml_quote(&scene.label));
            let _ = writeln!(out, "    execution_mode: {}", scene.execution_mode);
            if !scene.setup.is_empty() {
                let _ = writeln!(out, "    setup:");
                for command in &scene.setup {
                    let _ = writeln!(out, "      - {}", yaml_quote(command));
                }
            }
            if !scene.agent_prompts.is_empty() {
                let _ = writeln!(out, "    agent_prompts:");
                for (key, value) in &scene.agent_prompts {
                    let _ = writeln!(out, "      {key}: {value}");
                }
            }
            let _ = writeln!(out, "    actions:");
            for action in &scene.actions {
                action.render(&mut out);
            }
        }
        out
    }
}
