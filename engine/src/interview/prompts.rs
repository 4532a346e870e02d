//! Prompt assembly for one question
//!
//! The system prompt carries the agent's persona; the user prompt carries
//! the question text with scenario placeholders filled in, plus a replay of
//! any prior answers the memory plan attaches.

use sdk::types::{Agent, Scenario};
use std::sync::OnceLock;

fn placeholder_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("Invalid placeholder pattern")
    })
}

/// Fill `{{key}}` placeholders in question text from the scenario.
/// Placeholders with no scenario value are left verbatim.
pub fn render_template(text: &str, scenario: &Scenario) -> String {
    placeholder_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let key = &caps[1];
            match scenario.values.get(key) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// The persona instruction for a run of questions
pub fn system_prompt(agent: &Agent) -> String {
    let base = "You are answering questions as if you were a human. \
                Do not break character.";
    if agent.traits.is_empty() {
        return base.to_string();
    }
    let traits = serde_json::Value::Object(
        agent
            .traits
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );
    format!("{} You have the following traits: {}.", base, traits)
}

/// One question's prompt: rendered text plus replayed prior answers.
/// `memory` pairs prior question text with the answer given.
pub fn user_prompt(rendered_question: &str, memory: &[(String, String)]) -> String {
    let mut prompt = rendered_question.to_string();
    if !memory.is_empty() {
        prompt.push_str(
            "\n\nBefore the question you are now answering, \
             you already answered the following question(s):",
        );
        for (question_text, answer) in memory {
            prompt.push_str(&format!(
                "\n\tQuestion: {}\n\tAnswer: {}",
                question_text, answer
            ));
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_substitutes_scenario_values() {
        let scenario =
            Scenario::with_values([("period", json!("morning")), ("count", json!(3))]);
        assert_eq!(
            render_template("How are you feeling this {{period}}?", &scenario),
            "How are you feeling this morning?"
        );
        assert_eq!(
            render_template("You have {{ count }} tasks.", &scenario),
            "You have 3 tasks."
        );
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let scenario = Scenario::new();
        assert_eq!(
            render_template("Feeling {{period}}?", &scenario),
            "Feeling {{period}}?"
        );
    }

    #[test]
    fn test_system_prompt_includes_traits() {
        let agent = Agent::with_traits([("status", json!("happy"))]);
        let prompt = system_prompt(&agent);
        assert!(prompt.contains("Do not break character"));
        assert!(prompt.contains("\"status\":\"happy\""));
    }

    #[test]
    fn test_system_prompt_without_traits_is_base_only() {
        let prompt = system_prompt(&Agent::new());
        assert!(!prompt.contains("traits"));
    }

    #[test]
    fn test_user_prompt_replays_memory() {
        let memory = vec![("How are you?".to_string(), "Fine".to_string())];
        let prompt = user_prompt("And yesterday?", &memory);
        assert!(prompt.starts_with("And yesterday?"));
        assert!(prompt.contains("Question: How are you?"));
        assert!(prompt.contains("Answer: Fine"));
    }

    #[test]
    fn test_user_prompt_without_memory_is_question_only() {
        assert_eq!(user_prompt("Just this?", &[]), "Just this?");
    }
}
