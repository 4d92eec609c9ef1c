use crate::roll::{RResult, Roll, RollData, RollError};
use serde::{Deserialize, Serialize};

/// Who gets to see a roll posted to chat.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum RollMode {
    #[default]
    #[serde(rename = "publicroll")]
    Public,
    #[serde(rename = "gmroll")]
    Gm,
    #[serde(rename = "blindroll")]
    Blind,
    #[serde(rename = "selfroll")]
    SelfOnly,
}

/// Caller supplied overrides for a chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageData {
    /// Replaces the roll's own flavor.
    pub flavor: Option<String>,
    pub roll_mode: RollMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageData {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    pub rolls: Vec<RollData>,
    pub sound: String,
    pub roll_mode: RollMode,
    pub blind: bool,
}

impl ChatMessageData {
    pub const DICE_SOUND: &'static str = "sounds/dice.wav";
}

/// Whatever turns message data into a posted chat message.
pub trait MessageCreator {
    type Output;
    type Error: From<RollError>;

    fn create(&mut self, message: ChatMessageData) -> Result<Self::Output, Self::Error>;
}

impl Roll {
    pub fn to_message(&self, data: MessageData) -> RResult<ChatMessageData> {
        let total = self.total().ok_or(RollError::NotEvaluated)?;
        Ok(ChatMessageData {
            content: total.to_string(),
            flavor: data.flavor.or_else(|| self.flavor().map(str::to_string)),
            rolls: vec![self.to_data()],
            sound: ChatMessageData::DICE_SOUND.to_string(),
            roll_mode: data.roll_mode,
            blind: data.roll_mode == RollMode::Blind,
        })
    }

    pub fn to_message_with<C: MessageCreator>(
        &self,
        data: MessageData,
        creator: &mut C,
    ) -> Result<C::Output, C::Error> {
        let message = self.to_message(data)?;
        creator.create(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roll::{EvaluationOptions, RollOptions};
    use serde_json::json;

    #[derive(Default)]
    struct Log(Vec<ChatMessageData>);

    impl MessageCreator for Log {
        type Output = usize;
        type Error = RollError;

        fn create(&mut self, message: ChatMessageData) -> Result<usize, RollError> {
            self.0.push(message);
            Ok(self.0.len())
        }
    }

    fn evaluated(formula: &str) -> Roll {
        let mut roll =
            Roll::with_options(formula, json!({}), RollOptions::flavored("Attack")).unwrap();
        roll.evaluate_sync(EvaluationOptions::maximized()).unwrap();
        roll
    }

    #[test]
    fn test_to_message() {
        let message = evaluated("1d20 + 5").to_message(MessageData::default()).unwrap();
        assert_eq!(message.content, "25");
        assert_eq!(message.flavor.as_deref(), Some("Attack"));
        assert_eq!(message.rolls.len(), 1);
        assert!(!message.blind);

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["rollMode"], "publicroll");
        assert_eq!(json["sound"], "sounds/dice.wav");
    }

    #[test]
    fn test_message_overrides() {
        let data = MessageData {
            flavor: Some("Sneak attack".into()),
            roll_mode: RollMode::Blind,
        };
        let message = evaluated("3d6").to_message(data).unwrap();
        assert_eq!(message.flavor.as_deref(), Some("Sneak attack"));
        assert!(message.blind);
    }

    #[test]
    fn test_to_message_with() {
        let mut log = Log::default();
        let roll = evaluated("2");
        assert_eq!(roll.to_message_with(MessageData::default(), &mut log).unwrap(), 1);
        assert_eq!(log.0[0].content, "2");

        let unevaluated = Roll::new("1d6", json!({})).unwrap();
        assert!(matches!(
            unevaluated.to_message_with(MessageData::default(), &mut log),
            Err(RollError::NotEvaluated)
        ));
    }
}
