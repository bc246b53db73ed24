//! `hearth save`: Persist a memory item.

use super::Global;
use hearth_core::memory::{PREFERENCE_KEY, SPEAKER};
use hearth_core::{MemoryItem, MemoryType};

/// Build the item described by the command-line flags.
pub fn item(
    user: String,
    conversation: String,
    memory_type: MemoryType,
    content: String,
    id: Option<String>,
    speaker: Option<String>,
    key: Option<String>,
) -> MemoryItem {
    let mut item = MemoryItem::new(user, conversation, memory_type, content);
    if let Some(id) = id {
        item = item.with_id(id);
    }
    if let Some(speaker) = speaker {
        item.annotate(SPEAKER, speaker);
    }
    if let Some(key) = key {
        item.annotate(PREFERENCE_KEY, key);
    }
    item
}

pub async fn run(global: &Global, item: MemoryItem) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = global.orchestrator()?;
    orchestrator.save_context(item.clone()).await?;
    // Background writes must land before the process exits.
    orchestrator.flush().await;

    if global.json {
        return super::print_json(&item);
    }
    println!("💾 Saved {} to {}/{}", item.id, item.user_id, item.conversation_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_become_annotations() {
        let item = item(
            "u1".into(),
            "c1".into(),
            MemoryType::Preference,
            "Short answers".into(),
            Some("pref-1".into()),
            None,
            Some("verbosity".into()),
        );
        assert_eq!(item.id, "pref-1");
        assert_eq!(item.metadata[PREFERENCE_KEY], "verbosity");
        assert!(item.speaker().is_none());
    }

    #[test]
    fn fresh_id_when_omitted() {
        let a = item("u".into(), "c".into(), MemoryType::Conversation, "hi".into(), None, Some("user".into()), None);
        let b = item("u".into(), "c".into(), MemoryType::Conversation, "hi".into(), None, None, None);
        assert_ne!(a.id, b.id);
        assert_eq!(a.speaker(), Some("user"));
    }
}
