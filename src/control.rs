use std::sync::Arc;

use tracing::{info, warn};

use crate::relay::sources::{parse_channel_list, SourceChannels};

/// Exit status that asks the supervisor to start the relay again
pub const RESTART_EXIT_CODE: i32 = 75;

/// Menu buttons as (label, callback data)
pub const MENU_ACTIONS: [(&str, &str); 3] = [
    ("Set source", "set_source"),
    ("Show source", "show_source"),
    ("Reboot", "reboot"),
];

const SET_SOURCE_USAGE: &str = "Usage: /set_source <id>_<id>_...\n\
     Example: /set_source -1001234567890_-1009876543210";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Raw, still unparsed argument
    SetSource(Option<String>),
    ShowSource,
    Reboot,
    Menu,
    Help,
}

impl OperatorCommand {
    /// Parse a chat command such as `/set_source 1_2` or `/show_source@relay_bot`
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, argument) = match rest.split_once(char::is_whitespace) {
            Some((head, argument)) => (head, Some(argument.trim())),
            None => (rest, None),
        };
        // Commands in groups may carry the bot's username: /menu@relay_bot
        let name = head.split('@').next().unwrap_or(head);
        let argument = argument.filter(|a| !a.is_empty()).map(str::to_string);

        match name {
            "set_source" => Some(OperatorCommand::SetSource(argument)),
            "show_source" => Some(OperatorCommand::ShowSource),
            "reboot" => Some(OperatorCommand::Reboot),
            "menu" => Some(OperatorCommand::Menu),
            "start" | "help" => Some(OperatorCommand::Help),
            _ => None,
        }
    }

    /// Map a menu button press back to its command
    pub fn from_callback(data: &str) -> Option<Self> {
        match data {
            "set_source" => Some(OperatorCommand::SetSource(None)),
            "show_source" => Some(OperatorCommand::ShowSource),
            "reboot" => Some(OperatorCommand::Reboot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlResponse {
    Reply(String),
    /// Reply with the inline action menu attached
    Menu(String),
    /// Reply, then restart the process
    Restart(String),
}

/// Applies operator commands to the live runtime configuration
pub struct Controller {
    operator_id: u64,
    sources: Arc<SourceChannels>,
}

impl Controller {
    pub fn new(operator_id: u64, sources: Arc<SourceChannels>) -> Self {
        Self {
            operator_id,
            sources,
        }
    }

    pub fn is_operator(&self, issuer: u64) -> bool {
        issuer == self.operator_id
    }

    /// Returns `None` for anyone but the operator, so nothing is sent back.
    pub fn execute(&self, issuer: u64, command: OperatorCommand) -> Option<ControlResponse> {
        if !self.is_operator(issuer) {
            warn!("Ignoring {:?} from non-operator user {}", command, issuer);
            return None;
        }

        let response = match command {
            OperatorCommand::SetSource(None) => ControlResponse::Reply(SET_SOURCE_USAGE.to_string()),
            OperatorCommand::SetSource(Some(raw)) => match parse_channel_list(&raw) {
                Ok(ids) => {
                    let listed = format_ids(ids.iter());
                    self.sources.replace(ids);
                    info!("Source channels set to {}", listed);
                    ControlResponse::Reply(format!("Source channels updated: {}", listed))
                }
                Err(e) => ControlResponse::Reply(format!("{:#}\n\n{}", e, SET_SOURCE_USAGE)),
            },
            OperatorCommand::ShowSource => {
                let current = self.sources.snapshot();
                ControlResponse::Reply(format!("Source channels: {}", format_ids(current.iter())))
            }
            OperatorCommand::Reboot => {
                info!("Restart requested by operator");
                ControlResponse::Restart("Restarting...".to_string())
            }
            OperatorCommand::Menu => ControlResponse::Menu("Choose an action:".to_string()),
            OperatorCommand::Help => ControlResponse::Reply(
                "Commands:\n\
                 /set_source <id>_<id>_... - Replace the source channels\n\
                 /show_source - Show the source channels\n\
                 /reboot - Restart the relay\n\
                 /menu - Show these actions as buttons"
                    .to_string(),
            ),
        };
        Some(response)
    }
}

fn format_ids<'a>(ids: impl Iterator<Item = &'a i64>) -> String {
    let listed: Vec<String> = ids.map(|id| id.to_string()).collect();
    if listed.is_empty() {
        "(none)".to_string()
    } else {
        listed.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    const OPERATOR: u64 = 7;

    fn controller() -> (Controller, Arc<SourceChannels>) {
        let sources = Arc::new(SourceChannels::new([1]));
        (Controller::new(OPERATOR, sources.clone()), sources)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            OperatorCommand::parse("/set_source 100_200_300"),
            Some(OperatorCommand::SetSource(Some("100_200_300".to_string())))
        );
        assert_eq!(
            OperatorCommand::parse("/set_source"),
            Some(OperatorCommand::SetSource(None))
        );
        assert_eq!(
            OperatorCommand::parse("/show_source@relay_bot"),
            Some(OperatorCommand::ShowSource)
        );
        assert_eq!(OperatorCommand::parse("/reboot"), Some(OperatorCommand::Reboot));
        assert_eq!(OperatorCommand::parse("/menu"), Some(OperatorCommand::Menu));
        assert_eq!(OperatorCommand::parse("hello"), None);
        assert_eq!(OperatorCommand::parse("/unknown"), None);
    }

    #[test]
    fn test_operator_sets_sources() {
        let (controller, sources) = controller();

        let response = controller.execute(
            OPERATOR,
            OperatorCommand::SetSource(Some("100_200_300".to_string())),
        );

        assert!(matches!(response, Some(ControlResponse::Reply(_))));
        assert_eq!(*sources.snapshot(), BTreeSet::from([100, 200, 300]));
    }

    #[test]
    fn test_non_operator_is_ignored() {
        let (controller, sources) = controller();

        let response = controller.execute(
            OPERATOR + 1,
            OperatorCommand::SetSource(Some("100_200_300".to_string())),
        );

        assert_eq!(response, None);
        assert_eq!(*sources.snapshot(), BTreeSet::from([1]));
        assert_eq!(controller.execute(OPERATOR + 1, OperatorCommand::Reboot), None);
    }

    #[test]
    fn test_only_operator_is_recognized() {
        let (controller, _) = controller();

        assert!(controller.is_operator(OPERATOR));
        assert!(!controller.is_operator(OPERATOR + 1));
        assert!(!controller.is_operator(0));
    }

    #[test]
    fn test_set_source_without_argument_explains_usage() {
        let (controller, sources) = controller();

        let response = controller.execute(OPERATOR, OperatorCommand::SetSource(None));

        match response {
            Some(ControlResponse::Reply(text)) => assert!(text.contains("Usage")),
            other => panic!("unexpected response: {:?}", other),
        }
        assert_eq!(*sources.snapshot(), BTreeSet::from([1]));
    }

    #[test]
    fn test_set_source_with_bad_id_leaves_set_unchanged() {
        let (controller, sources) = controller();

        let response = controller.execute(
            OPERATOR,
            OperatorCommand::SetSource(Some("100_abc".to_string())),
        );

        match response {
            Some(ControlResponse::Reply(text)) => assert!(text.contains("'abc'")),
            other => panic!("unexpected response: {:?}", other),
        }
        assert_eq!(*sources.snapshot(), BTreeSet::from([1]));
    }

    #[test]
    fn test_show_source() {
        let (controller, sources) = controller();
        sources.replace(BTreeSet::from([-200, -100]));

        assert_eq!(
            controller.execute(OPERATOR, OperatorCommand::ShowSource),
            Some(ControlResponse::Reply("Source channels: -200, -100".to_string()))
        );
    }

    #[test]
    fn test_reboot_requests_restart() {
        let (controller, _) = controller();
        assert!(matches!(
            controller.execute(OPERATOR, OperatorCommand::Reboot),
            Some(ControlResponse::Restart(_))
        ));
    }

    #[test]
    fn test_menu_buttons_map_to_commands() {
        for (_, data) in MENU_ACTIONS {
            assert!(OperatorCommand::from_callback(data).is_some());
        }
        assert_eq!(
            OperatorCommand::from_callback("set_source"),
            Some(OperatorCommand::SetSource(None))
        );
        assert_eq!(OperatorCommand::from_callback("bogus"), None);
    }
}
