use crate::llm::provider::Capabilities;
use crate::llm::registry::Addressing;
use crate::perception::types::ElementIndex;

const COORDINATE_PROMPT: &str = "\
You are a desktop automation operator running on {os}. You see the current screen and decide \
the next actions that move the user's objective forward.

Reply with a JSON array of action objects and nothing else. Available actions:
- {\"type\": \"click\", \"x\": 0.50, \"y\": 0.10}  x and y are fractions of the screen width and height (0.0 to 1.0), measured from the top-left corner.
- {\"type\": \"write\", \"text\": \"hello\"}  types the text into the focused element.
- {\"type\": \"press\", \"keys\": [\"{modifier}\", \"c\"]}  presses the keys as one chord.
- {\"type\": \"search\", \"text\": \"Terminal\"}  opens the system launcher and searches for an app or file.
- {\"type\": \"done\", \"summary\": \"what was achieved\"}  the objective is complete.

Rules:
- Return a few actions at most; the screen is captured again after they run.
- Put done last. Nothing after it is executed.
- Click a text field before writing into it.
- The mouse pointer is drawn on the screenshot when available.";

const LABEL_PROMPT: &str = "\
You are a desktop automation operator running on {os}. You see the current screen together \
with a numbered list of the text elements detected on it, and decide the next actions that \
move the user's objective forward.

Reply with a JSON array of action objects and nothing else. Available actions:
- {\"type\": \"click\", \"label\": \"Settings\"}  label is the exact text of one listed element.
- {\"type\": \"write\", \"text\": \"hello\"}  types the text into the focused element.
- {\"type\": \"press\", \"keys\": [\"{modifier}\", \"c\"]}  presses the keys as one chord.
- {\"type\": \"search\", \"text\": \"Terminal\"}  opens the system launcher and searches for an app or file.
- {\"type\": \"done\", \"summary\": \"what was achieved\"}  the objective is complete.

Rules:
- Only click labels that appear in the element list. If the target has no text, use press or search.
- Put done last. Nothing after it is executed.
- Click a text field before writing into it.";

const FORMAT_REMINDER: &str = "\n\nIMPORTANT: your whole reply must be a single JSON array such as \
[{\"type\": \"click\", \"x\": 0.5, \"y\": 0.5}]. Do not describe the screen, do not add prose.";

/// Primary modifier named in the prompt examples.
fn primary_modifier() -> &'static str {
    if cfg!(target_os = "macos") {
        "command"
    } else {
        "ctrl"
    }
}

/// Fixed system instructions for a mode.
pub fn system_prompt(addressing: Addressing, capabilities: Capabilities) -> String {
    let template = match addressing {
        Addressing::Coordinates => COORDINATE_PROMPT,
        Addressing::Labels => LABEL_PROMPT,
    };
    let mut prompt = template
        .replace("{os}", std::env::consts::OS)
        .replace("{modifier}", primary_modifier());
    if !capabilities.returns_structured_json {
        prompt.push_str(FORMAT_REMINDER);
    }
    prompt
}

/// User text for one cycle: objective, the element list when the mode uses
/// labels, and what went wrong last cycle.
pub fn cycle_prompt(objective: &str, elements: Option<&ElementIndex>, feedback: &[String]) -> String {
    let mut prompt = format!("Objective: {objective}\n");

    if !feedback.is_empty() {
        prompt.push_str("\nProblems with your previous actions:\n");
        for line in feedback {
            prompt.push_str("- ");
            prompt.push_str(line);
            prompt.push('\n');
        }
    }

    if let Some(index) = elements {
        if index.is_empty() {
            prompt.push_str("\nNo text elements were detected on this screen.\n");
        } else {
            prompt.push_str("\nText elements on screen:\n");
            prompt.push_str(&index.render());
            prompt.push('\n');
        }
    }

    prompt.push_str("\nWhat are the next actions? Reply with the JSON array only.");
    prompt
}

/// Correction sent when the previous reply held no usable action.
pub fn reprompt_after_parse_failure(objective: &str, error: &str) -> String {
    format!(
        "Your previous reply could not be used: {error}\n\
         Objective: {objective}\n\
         Reply again with ONLY a JSON array of actions, e.g. [{{\"type\": \"done\"}}]."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::{ActionableElement, BoundingBox};

    const JSON_OK: Capabilities = Capabilities {
        accepts_image: true,
        accepts_element_list: false,
        returns_structured_json: true,
    };

    #[test]
    fn prompts_are_filled_in() {
        let p = system_prompt(Addressing::Coordinates, JSON_OK);
        assert!(!p.contains("{os}"));
        assert!(!p.contains("{modifier}"));
        assert!(p.contains("\"x\": 0.50"));
        assert!(!p.contains("IMPORTANT"));

        let loose = Capabilities { returns_structured_json: false, ..JSON_OK };
        assert!(system_prompt(Addressing::Labels, loose).ends_with("do not add prose."));
    }

    #[test]
    fn cycle_prompt_lists_elements_and_feedback() {
        let element = ActionableElement::from_region("Settings", BoundingBox::new(10.0, 10.0, 30.0, 20.0), 100, 100)
            .unwrap();
        let index = ElementIndex::new(vec![element]);
        let p = cycle_prompt(
            "open the settings menu",
            Some(&index),
            &["click 'Save': no element matches".to_string()],
        );
        assert!(p.starts_with("Objective: open the settings menu"));
        assert!(p.contains("- click 'Save': no element matches"));
        assert!(p.contains("\"Settings\""));

        let bare = cycle_prompt("x", None, &[]);
        assert!(!bare.contains("elements"));
        assert!(!bare.contains("Problems"));
    }
}
