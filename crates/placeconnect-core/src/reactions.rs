use placeconnect_types::api::ReactionGroup;
use placeconnect_types::models::Reaction;
use uuid::Uuid;

/// Whether a toggle adds a reaction or removes an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Add,
    Remove { id: Uuid },
}

/// Toggle the (message, user, emoji) reaction against the rows held locally.
pub fn toggle_plan(reactions: &[Reaction], message_id: Uuid, user_id: Uuid, emoji: &str) -> Toggle {
    match reactions.iter().find(|r| r.matches(message_id, user_id, emoji)) {
        Some(existing) => Toggle::Remove { id: existing.id },
        None => Toggle::Add,
    }
}

/// Fold the reactions on `message_id` into per-emoji groups, in the order each
/// emoji was first used.
pub fn group_reactions(reactions: &[Reaction], message_id: Uuid) -> Vec<ReactionGroup> {
    let mut groups: Vec<ReactionGroup> = Vec::new();
    for r in reactions.iter().filter(|r| r.message_id == message_id) {
        match groups.iter_mut().find(|g| g.emoji == r.emoji) {
            Some(group) => {
                if !group.user_ids.contains(&r.user_id) {
                    group.user_ids.push(r.user_id);
                    group.count += 1;
                }
            }
            None => groups.push(ReactionGroup {
                emoji: r.emoji.clone(),
                count: 1,
                user_ids: vec![r.user_id],
            }),
        }
    }
    groups
}
