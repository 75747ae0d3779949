use std::collections::HashMap;

use crate::MetaDot;

use super::LoadError;

/// Fills in parent names, depths and subtree sizes.
///
/// Every dot's ancestor chain is walked up to the root: its length is the
/// dot's depth, and each ancestor passed counts the dot as a descendant.
/// All dots must already be present.
pub(super) fn fill_meta_dots(dots: &mut HashMap<u64, MetaDot>) -> Result<(), LoadError> {
    match dots.get(&0) {
        Some(root) if root.parent_id() == 0 => {}
        _ => return Err(LoadError::MissingRoot),
    }

    let mut children: HashMap<u64, u64> = HashMap::with_capacity(dots.len());
    let mut computed = Vec::with_capacity(dots.len());

    for (&id, meta_dot) in dots.iter() {
        if id != 0 && meta_dot.parent_id() == id {
            return Err(LoadError::Cycle(id));
        }

        let parent_name = dots
            .get(&meta_dot.parent_id())
            .map(|parent| parent.name().to_string())
            .ok_or(LoadError::MissingParent {
                id,
                parent_id: meta_dot.parent_id(),
            })?;

        let mut depth = 0u64;
        let mut current = id;
        let mut parent = meta_dot.parent_id();
        while current != parent {
            let ancestor = dots.get(&parent).ok_or(LoadError::MissingParent {
                id: current,
                parent_id: parent,
            })?;
            *children.entry(parent).or_default() += 1;
            depth += 1;
            if depth > dots.len() as u64 {
                return Err(LoadError::Cycle(id));
            }
            current = parent;
            parent = ancestor.parent_id();
        }

        computed.push((id, parent_name, depth));
    }

    for (id, parent_name, depth) in computed {
        if let Some(meta_dot) = dots.get_mut(&id) {
            meta_dot.parent_name = parent_name;
            meta_dot.depth = depth;
            meta_dot.children = children.get(&id).copied().unwrap_or_default();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::fill_meta_dots;
    use crate::fixtures::{generated_dots, SCENARIO_DOTS};
    use crate::tree::LoadError;
    use crate::{Dot, MetaDot};

    fn meta(dots: impl IntoIterator<Item = Dot>) -> HashMap<u64, MetaDot> {
        dots.into_iter()
            .map(|d| (d.id, MetaDot::new(d)))
            .collect()
    }

    #[test]
    fn scenario_metadata() {
        let mut dots = meta(SCENARIO_DOTS.clone());
        fill_meta_dots(&mut dots).expect("must fill");

        assert_eq!(
            vec![(0, 0, 2, "root"), (1, 1, 1, "root"), (2, 2, 0, "a")],
            (0..3)
                .map(|id| {
                    let d = &dots[&id];
                    (id, d.depth(), d.children(), d.parent_name())
                })
                .collect::<Vec<_>>()
        );
    }

    /// Depth grows by one per edge and children equals the subtree size,
    /// checked against an independent recursive count.
    #[rstest]
    #[case::wide(400, 2)]
    #[case::deep(120, 1)]
    #[case::mixed(1000, 7)]
    fn depth_and_subtree_sizes(#[case] count: u64, #[case] branching: u64) {
        let mut dots = meta(generated_dots(count, branching));
        fill_meta_dots(&mut dots).expect("must fill");

        let mut direct: HashMap<u64, Vec<u64>> = HashMap::new();
        for d in dots.values().filter(|d| d.id() != 0) {
            direct.entry(d.parent_id()).or_default().push(d.id());
        }
        fn subtree(id: u64, direct: &HashMap<u64, Vec<u64>>) -> u64 {
            direct
                .get(&id)
                .map(|kids| kids.iter().map(|k| 1 + subtree(*k, direct)).sum())
                .unwrap_or(0)
        }

        assert_eq!(0, dots[&0].depth());
        for d in dots.values() {
            assert_eq!(subtree(d.id(), &direct), d.children(), "dot {}", d.id());
            if d.id() != 0 {
                assert_eq!(dots[&d.parent_id()].depth() + 1, d.depth(), "dot {}", d.id());
            }
        }
    }

    #[rstest]
    #[case::no_root(vec![Dot::new(1, 0, "a", "")])]
    #[case::root_with_parent(vec![Dot::new(0, 1, "root", ""), Dot::new(1, 0, "a", "")])]
    fn missing_root(#[case] dots: Vec<Dot>) {
        assert!(matches!(
            fill_meta_dots(&mut meta(dots)),
            Err(LoadError::MissingRoot)
        ));
    }

    #[test]
    fn missing_parent() {
        let mut dots = meta([Dot::new(0, 0, "root", ""), Dot::new(5, 4, "orphan", "")]);
        assert!(matches!(
            fill_meta_dots(&mut dots),
            Err(LoadError::MissingParent {
                id: 5,
                parent_id: 4
            })
        ));
    }

    #[rstest]
    #[case::self_parent(vec![Dot::new(0, 0, "root", ""), Dot::new(3, 3, "loop", "")])]
    #[case::two_cycle(vec![
        Dot::new(0, 0, "root", ""),
        Dot::new(1, 2, "a", ""),
        Dot::new(2, 1, "b", ""),
    ])]
    fn cycles(#[case] dots: Vec<Dot>) {
        assert!(matches!(
            fill_meta_dots(&mut meta(dots)),
            Err(LoadError::Cycle(_))
        ));
    }
}
