//! Reconstruction of reply trees from flat, parent-referencing comment lists.
//!
//! Sources hand out comments as one ordered stream where replies point at
//! their parent by id. [`build_forest`] turns that stream into an ordered
//! forest; [`traverse`] walks a forest depth-first for export.

use crate::error::IngestError;
use crate::models::{Comment, RawComment};
use std::collections::HashMap;
use tracing::debug;

/// Build the reply forest for one resource.
///
/// Siblings keep their arrival order. Every `parent_id` must name another
/// comment in `comments`; otherwise [`IngestError::UnresolvedParent`] is
/// returned and no partial tree is produced.
pub fn build_forest(resource: &str, comments: Vec<RawComment>) -> Result<Vec<Comment>, IngestError> {
    let mut index_by_id: HashMap<&str, usize> = HashMap::with_capacity(comments.len());
    for (i, c) in comments.iter().enumerate() {
        index_by_id.entry(c.id.as_str()).or_insert(i);
    }

    let mut roots = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); comments.len()];
    for (i, c) in comments.iter().enumerate() {
        match c.parent_id.as_deref() {
            Some(parent) => match index_by_id.get(parent) {
                Some(&p) if p != i => children[p].push(i),
                _ => {
                    return Err(IngestError::UnresolvedParent {
                        resource: resource.to_string(),
                        comment: c.id.clone(),
                        parent: parent.to_string(),
                    });
                }
            },
            None => roots.push(i),
        }
    }

    // A parent cycle leaves its members unreachable from any root.
    let reachable = count_reachable(&roots, &children);
    if reachable != comments.len() {
        let stray = first_unreachable(&roots, &children, comments.len());
        let c = &comments[stray];
        return Err(IngestError::UnresolvedParent {
            resource: resource.to_string(),
            comment: c.id.clone(),
            parent: c.parent_id.clone().unwrap_or_default(),
        });
    }
    drop(index_by_id);

    let mut slots: Vec<Option<RawComment>> = comments.into_iter().map(Some).collect();
    let forest = roots
        .iter()
        .map(|&r| assemble(r, &children, &mut slots))
        .collect::<Vec<_>>();
    debug!(resource, roots = forest.len(), total = reachable, "Built comment forest");
    Ok(forest)
}

fn count_reachable(roots: &[usize], children: &[Vec<usize>]) -> usize {
    let mut stack = roots.to_vec();
    let mut seen = 0;
    while let Some(i) = stack.pop() {
        seen += 1;
        stack.extend(children[i].iter().copied());
    }
    seen
}

fn first_unreachable(roots: &[usize], children: &[Vec<usize>], len: usize) -> usize {
    let mut reached = vec![false; len];
    let mut stack = roots.to_vec();
    while let Some(i) = stack.pop() {
        reached[i] = true;
        stack.extend(children[i].iter().copied());
    }
    reached.iter().position(|r| !r).unwrap_or_default()
}

fn assemble(i: usize, children: &[Vec<usize>], slots: &mut [Option<RawComment>]) -> Comment {
    let mut comment = slots[i].take().map(Comment::from).unwrap_or_default();
    comment.replies = children[i]
        .iter()
        .map(|&c| assemble(c, children, slots))
        .collect();
    comment
}

/// Lazy depth-first walk over a forest, yielding `(depth, comment)`.
///
/// Roots have depth 0. A comment is yielded before its replies, and its
/// whole subtree before its next sibling.
pub struct Traversal<'a> {
    stack: Vec<(usize, &'a Comment)>,
}

impl<'a> Iterator for Traversal<'a> {
    type Item = (usize, &'a Comment);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, comment) = self.stack.pop()?;
        self.stack
            .extend(comment.replies.iter().rev().map(|c| (depth + 1, c)));
        Some((depth, comment))
    }
}

pub fn traverse(forest: &[Comment]) -> Traversal<'_> {
    Traversal {
        stack: forest.iter().rev().map(|c| (0, c)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, parent: Option<&str>) -> RawComment {
        RawComment {
            id: id.to_string(),
            text: format!("text of {id}"),
            author_name: "someone".to_string(),
            parent_id: parent.map(str::to_string),
            ..Default::default()
        }
    }

    fn flatten(forest: &[Comment]) -> Vec<(usize, String)> {
        traverse(forest).map(|(d, c)| (d, c.id.clone())).collect()
    }

    #[test]
    fn test_flat_list_stays_flat() {
        let forest = build_forest("p", vec![raw("a", None), raw("b", None)]).unwrap();
        assert_eq!(forest.len(), 2);
        assert_eq!(flatten(&forest), vec![(0, "a".into()), (0, "b".into())]);
    }

    #[test]
    fn test_replies_follow_parent_before_later_siblings() {
        let input = vec![
            raw("a", None),
            raw("b", None),
            raw("a1", Some("a")),
            raw("b1", Some("b")),
            raw("a2", Some("a")),
            raw("a1x", Some("a1")),
        ];
        let forest = build_forest("p", input).unwrap();
        assert_eq!(
            flatten(&forest),
            vec![
                (0, "a".into()),
                (1, "a1".into()),
                (2, "a1x".into()),
                (1, "a2".into()),
                (0, "b".into()),
                (1, "b1".into()),
            ]
        );
    }

    #[test]
    fn test_every_comment_appears_exactly_once() {
        let input = vec![
            raw("1", None),
            raw("2", Some("1")),
            raw("3", Some("2")),
            raw("4", None),
            raw("5", Some("1")),
            raw("6", Some("4")),
        ];
        let forest = build_forest("p", input.clone()).unwrap();
        let mut ids: Vec<String> = traverse(&forest).map(|(_, c)| c.id.clone()).collect();
        ids.sort();
        let mut expected: Vec<String> = input.into_iter().map(|c| c.id).collect();
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_parent_may_appear_after_child() {
        let forest = build_forest("p", vec![raw("r", Some("late")), raw("late", None)]).unwrap();
        assert_eq!(flatten(&forest), vec![(0, "late".into()), (1, "r".into())]);
    }

    #[test]
    fn test_unresolved_parent_is_an_error() {
        let err = build_forest("42", vec![raw("a", None), raw("b", Some("missing"))]).unwrap_err();
        match err {
            IngestError::UnresolvedParent {
                resource,
                comment,
                parent,
            } => {
                assert_eq!(resource, "42");
                assert_eq!(comment, "b");
                assert_eq!(parent, "missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parent_cycle_is_rejected() {
        let err = build_forest("p", vec![raw("a", Some("b")), raw("b", Some("a"))]).unwrap_err();
        assert!(matches!(err, IngestError::UnresolvedParent { .. }));
        let err = build_forest("p", vec![raw("self", Some("self"))]).unwrap_err();
        assert!(matches!(err, IngestError::UnresolvedParent { .. }));
    }

    #[test]
    fn test_comment_fields_survive_assembly() {
        let mut c = raw("a", None);
        c.like_count = Some(3);
        c.created_time = Some("2015-01-01T10:00:00+0000".to_string());
        let forest = build_forest("p", vec![c]).unwrap();
        assert_eq!(forest[0].like_count, Some(3));
        assert_eq!(forest[0].text, "text of a");
    }

    fn has_cycle(parents: &[Option<usize>]) -> bool {
        (0..parents.len()).any(|start| {
            let mut at = parents[start];
            for _ in 0..parents.len() {
                match at {
                    Some(p) if p == start => return true,
                    Some(p) => at = parents[p],
                    None => return false,
                }
            }
            // Stuck in a loop that does not contain `start`.
            at.is_some()
        })
    }

    fn children_of(forest: &[Comment], parent: Option<&str>, out: &mut HashMap<Option<String>, Vec<String>>) {
        out.insert(parent.map(str::to_string), forest.iter().map(|c| c.id.clone()).collect());
        for c in forest {
            children_of(&c.replies, Some(&c.id), out);
        }
    }

    /// Every parent assignment over up to four comments, cycles included.
    #[test]
    fn test_all_small_parent_assignments() {
        for n in 1..=4usize {
            let cases = (n + 1).pow(n as u32);
            for case in 0..cases {
                let mut digits = case;
                let parents: Vec<Option<usize>> = (0..n)
                    .map(|_| {
                        let d = digits % (n + 1);
                        digits /= n + 1;
                        d.checked_sub(1)
                    })
                    .collect();
                let ids: Vec<String> = (0..n).map(|i| format!("c{i}")).collect();
                let input: Vec<RawComment> = (0..n)
                    .map(|i| raw(&ids[i], parents[i].map(|p| ids[p].as_str())))
                    .collect();

                let result = build_forest("p", input);
                if has_cycle(&parents) {
                    assert!(
                        matches!(result, Err(IngestError::UnresolvedParent { .. })),
                        "{parents:?} should be rejected"
                    );
                    continue;
                }
                let forest = result.unwrap_or_else(|e| panic!("{parents:?} rejected: {e}"));
                assert_eq!(traverse(&forest).count(), n, "{parents:?}");

                let mut actual = HashMap::new();
                children_of(&forest, None, &mut actual);
                for parent in std::iter::once(None).chain((0..n).map(Some)) {
                    let expected: Vec<String> = (0..n)
                        .filter(|&i| parents[i] == parent)
                        .map(|i| ids[i].clone())
                        .collect();
                    let key = parent.map(|p| ids[p].clone());
                    assert_eq!(
                        actual.get(&key).cloned().unwrap_or_default(),
                        expected,
                        "children of {key:?} for {parents:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_empty_input() {
        let forest = build_forest("p", Vec::new()).unwrap();
        assert!(forest.is_empty());
        assert_eq!(traverse(&forest).count(), 0);
    }
}
