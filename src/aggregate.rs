//! Per-user statistics over a stored snapshot.
//!
//! Every post author, every reacting user and every comment author (at any
//! depth of the reply forest) counts as one action of that user. Users are
//! keyed by id; an entity without an author id has no stable identity and
//! is left out. A user keeps the first name seen for its id.

use crate::models::{Snapshot, UserRef};
use crate::tree::traverse;
use clap::ValueEnum;
use itertools::Itertools;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Post,
    LikePost,
    Comment,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Post, Action::LikePost, Action::Comment];

    pub fn label(self) -> &'static str {
        match self {
            Action::Post => "post",
            Action::LikePost => "like_post",
            Action::Comment => "comment",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionCounts {
    pub post: u64,
    pub like_post: u64,
    pub comment: u64,
}

impl ActionCounts {
    pub fn get(&self, action: Action) -> u64 {
        match action {
            Action::Post => self.post,
            Action::LikePost => self.like_post,
            Action::Comment => self.comment,
        }
    }

    fn bump(&mut self, action: Action) {
        match action {
            Action::Post => self.post += 1,
            Action::LikePost => self.like_post += 1,
            Action::Comment => self.comment += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.post + self.like_post + self.comment
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub id: String,
    pub name: String,
    pub actions: ActionCounts,
}

/// What a "top users" view is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Ranking {
    /// All actions together.
    Total,
    /// Comments written.
    Comment,
    /// Posts liked.
    Like,
}

impl Ranking {
    fn score(self, actions: &ActionCounts) -> u64 {
        match self {
            Ranking::Total => actions.total(),
            Ranking::Comment => actions.get(Action::Comment),
            Ranking::Like => actions.get(Action::LikePost),
        }
    }
}

/// Every attributable action in the snapshot, in document order.
pub fn observed_users(snapshot: &Snapshot) -> Vec<(Action, UserRef)> {
    let mut seen = Vec::new();
    for post in &snapshot.posts {
        if let Some(author) = post.author() {
            seen.push((Action::Post, author));
        }
        seen.extend(post.reactions.iter().cloned().map(|u| (Action::LikePost, u)));
        seen.extend(
            traverse(&post.comments)
                .filter_map(|(_, c)| c.author())
                .map(|u| (Action::Comment, u)),
        );
    }
    seen
}

fn rank_key(ranking: Ranking, user: &UserStats) -> (Reverse<u64>, &str, &str) {
    (Reverse(ranking.score(&user.actions)), &user.name, &user.id)
}

/// Action counts per user, most active first.
///
/// Ties are broken by name, then id, so the order is fully deterministic.
pub fn user_stats(snapshot: &Snapshot) -> Vec<UserStats> {
    let mut by_id: HashMap<String, UserStats> = HashMap::new();
    for (action, user) in observed_users(snapshot) {
        by_id
            .entry(user.id.clone())
            .or_insert_with(|| UserStats {
                id: user.id,
                name: user.name,
                actions: ActionCounts::default(),
            })
            .actions
            .bump(action);
    }
    by_id
        .into_values()
        .sorted_by(|a, b| rank_key(Ranking::Total, a).cmp(&rank_key(Ranking::Total, b)))
        .collect()
}

/// The `n` highest-ranked users under `ranking`.
pub fn top_users(stats: &[UserStats], ranking: Ranking, n: usize) -> Vec<&UserStats> {
    stats
        .iter()
        .sorted_by(|a, b| rank_key(ranking, a).cmp(&rank_key(ranking, b)))
        .take(n)
        .collect()
}

/// Display names used by more than one account, with those accounts' ids.
///
/// Names with the most ids come first, then by name.
pub fn duplicate_names(snapshot: &Snapshot) -> Vec<(String, BTreeSet<String>)> {
    let mut ids_by_name: HashMap<String, BTreeSet<String>> = HashMap::new();
    for (_, user) in observed_users(snapshot) {
        ids_by_name.entry(user.name).or_default().insert(user.id);
    }
    ids_by_name
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .sorted_by(|(a_name, a_ids), (b_name, b_ids)| {
            b_ids.len().cmp(&a_ids.len()).then_with(|| a_name.cmp(b_name))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTotal {
    pub action: Action,
    /// Number of actions of this kind.
    pub entries: usize,
    /// Number of distinct users behind them.
    pub users: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTotals {
    pub by_action: Vec<ActionTotal>,
    pub entries: usize,
    pub users: usize,
}

/// Entry and distinct-user counts per action kind and overall.
pub fn action_totals(snapshot: &Snapshot) -> ActionTotals {
    let observed = observed_users(snapshot);
    let by_action = Action::ALL
        .iter()
        .map(|&action| {
            let ids: Vec<&str> = observed
                .iter()
                .filter(|(a, _)| *a == action)
                .map(|(_, u)| u.id.as_str())
                .collect();
            ActionTotal {
                action,
                entries: ids.len(),
                users: ids.iter().unique().count(),
            }
        })
        .collect();
    let users: HashSet<&str> = observed.iter().map(|(_, u)| u.id.as_str()).collect();
    ActionTotals {
        by_action,
        entries: observed.len(),
        users: users.len(),
    }
}

/// Number of comments across all forests, replies included.
pub fn comment_count(snapshot: &Snapshot) -> usize {
    snapshot
        .posts
        .iter()
        .map(|post| traverse(&post.comments).count())
        .sum()
}
