//! JSON Schema for the screenplay document, printed by `validate --json-schema`.

pub const SCREENPLAY_JSON_SCHEMA: &str = r##"
{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "Screenplay",
  "type": "object",
  "required": ["title", "output", "scenarios"],
  "properties": {
    "title": { "type": "string", "minLength": 1 },
    "output": { "type": "string", "pattern": "^[A-Za-z0-9._-]+$" },
    "settings": {
      "type": "object",
      "properties": {
        "width": { "type": "integer" },
        "height": { "type": "integer" },
        "font_size": { "type": "integer" },
        "theme": { "type": "string" },
        "padding": { "type": "integer" },
        "margin": { "type": "integer" },
        "margin_fill": { "type": "string" },
        "border_radius": { "type": "integer" },
        "window_bar": { "type": "string" },
        "font_family": { "type": ["string", "null"] },
        "framerate": { "type": "integer" },
        "line_height": { "type": "number" },
        "letter_spacing": { "type": "integer" },
        "cursor_blink": { "type": "boolean" }
      },
      "additionalProperties": false
    },
    "variables": { "type": "object" },
    "preinstall": { "type": "array", "items": { "type": "string" } },
    "agent_prompts": { "$ref": "#/$defs/prompt_policy" },
    "scenarios": {
      "type": "array",
      "minItems": 1,
      "items": {
        "type": "object",
        "required": ["label", "actions"],
        "properties": {
          "label": { "type": "string", "minLength": 1 },
          "surface": { "const": "terminal" },
          "execution_mode": { "enum": ["scripted", "interactive", "visual"] },
          "shell": { "enum": ["auto", "bash", "zsh", "fish", "sh", "pwsh", "cmd"] },
          "prompt": { "type": "object" },
          "setup": { "type": "array", "items": { "type": "string" } },
          "agent_prompts": { "$ref": "#/$defs/prompt_policy" },
          "actions": {
            "type": "array",
            "minItems": 1,
            "items": {
              "anyOf": [
                { "type": "string" },
                {
                  "type": "object",
                  "properties": {
                    "command": { "type": "string" },
                    "type": { "type": "string" },
                    "input": { "type": "string" },
                    "key": { "type": "string" },
                    "hotkey": { "type": "string" },
                    "sleep": { "$ref": "#/$defs/duration" },
                    "wait_for": { "type": "string" },
                    "wait_mode": { "enum": ["default", "screen", "line"] },
                    "wait_timeout": { "$ref": "#/$defs/duration" },
                    "wait_screen_regex": { "type": "string" },
                    "wait_line_regex": { "type": "string" },
                    "wait_stable": { "$ref": "#/$defs/duration" },
                    "assert_screen_regex": { "type": "string" },
                    "assert_not_screen_regex": { "type": "string" },
                    "expect_exit_code": { "type": "integer" },
                    "id": { "type": "string" },
                    "timeout": { "$ref": "#/$defs/duration" },
                    "retries": { "type": "integer", "minimum": 0 }
                  },
                  "additionalProperties": false,
                  "minProperties": 1
                }
              ]
            }
          }
        },
        "additionalProperties": false
      }
    }
  },
  "additionalProperties": false,
  "$defs": {
    "duration": { "type": "string", "pattern": "^\\d+(ms|s)$" },
    "prompt_policy": {
      "type": "object",
      "properties": {
        "mode": { "enum": ["manual", "approve", "deny"] },
        "prompt_regex": { "type": "string" },
        "allow_regex": { "type": "string" },
        "allowed_command_prefixes": { "type": "array", "items": { "type": "string" } },
        "max_rounds": { "type": "integer", "minimum": 1, "maximum": 6 },
        "approve_key": { "type": "string" },
        "deny_key": { "type": "string" }
      },
      "additionalProperties": false
    }
  }
}
"##;
