use std::collections::HashMap;

use tracing::debug;

use crate::MetaDot;

use super::RouteError;

/// Final route segment of a configuration document.
/// Requests addressed to it are never dispatched.
pub const RESERVED_SEGMENT: &str = "dot.json";

/// Builds the canonical route of every non-root dot: `/` followed by the
/// names from the root's child down to the dot, joined with `/`.
///
/// The metadata must already be filled in, so every ancestor chain is known
/// to end at the root. Names must be non-empty and free of `/`.
pub(super) fn build_routes(
    dots: &mut HashMap<u64, MetaDot>,
) -> Result<HashMap<String, u64>, RouteError> {
    let mut routes = HashMap::with_capacity(dots.len());

    for (&id, meta_dot) in dots.iter() {
        if id == 0 {
            continue;
        }
        if !is_segment(meta_dot.name()) {
            return Err(RouteError::InvalidName {
                id,
                name: meta_dot.name().to_string(),
            });
        }

        let mut names = Vec::with_capacity(meta_dot.depth() as usize);
        let mut current = meta_dot;
        while current.id() != 0 {
            names.push(current.name());
            match dots.get(&current.parent_id()) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        names.reverse();

        let route = format!("/{}", names.join("/"));
        if routes.insert(route.clone(), id).is_some() {
            return Err(RouteError::DuplicateRoute(route));
        }
    }

    for (route, id) in routes.iter() {
        if let Some(meta_dot) = dots.get_mut(id) {
            meta_dot.dot_route = Some(route.clone());
        }
    }
    debug!(routes = routes.len(), "routes generated");

    Ok(routes)
}

fn is_segment(name: &str) -> bool {
    !name.is_empty() && !name.contains('/')
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::fixtures::{generated_dots, SCENARIO_DOTS};
    use crate::tree::{DotTree, RouteError};
    use crate::Dot;

    #[test]
    fn scenario_routes() {
        let mut tree = DotTree::from_dots(SCENARIO_DOTS.clone()).expect("tree");
        tree.generate_routes().expect("routes");

        assert_eq!(
            vec![("/a", 1), ("/a/b", 2)],
            tree.routes()
                .into_iter()
                .map(|(route, d)| (route, d.id()))
                .collect::<Vec<_>>()
        );
        assert_eq!(None, tree.dot(0).and_then(|d| d.route()));
    }

    #[test]
    fn one_distinct_route_per_non_root_dot() {
        let mut tree = DotTree::from_dots(generated_dots(500, 3)).expect("tree");
        tree.generate_routes().expect("routes");

        let routes = tree.routes();
        assert_eq!(tree.len() - 1, routes.len());
        assert_eq!(
            routes.len(),
            routes.iter().map(|(r, _)| *r).collect::<HashSet<_>>().len()
        );

        let by_id: HashMap<u64, &str> = routes.iter().map(|(r, d)| (d.id(), *r)).collect();
        for (route, d) in &routes {
            assert_eq!(d.depth() as usize, route.matches('/').count());
            if d.parent_id() != 0 {
                let parent = by_id[&d.parent_id()];
                assert_eq!(format!("{}/{}", parent, d.name()), *route);
            }
        }
    }

    #[test]
    fn duplicate_sibling_names() {
        let mut tree = DotTree::from_dots([
            Dot::new(0, 0, "root", ""),
            Dot::new(1, 0, "a", ""),
            Dot::new(2, 0, "a", ""),
        ])
        .expect("tree");

        assert_eq!(
            Err(RouteError::DuplicateRoute("/a".into())),
            tree.generate_routes()
        );
    }

    #[rstest]
    #[case::empty_inner(1, "")]
    #[case::empty_leaf(2, "")]
    #[case::slash(2, "x/y")]
    #[case::leading_slash(1, "/a")]
    fn names_must_be_segments(#[case] id: u64, #[case] name: &str) {
        let mut dots = vec![
            Dot::new(0, 0, "root", ""),
            Dot::new(1, 0, "a", ""),
            Dot::new(2, 1, "b", ""),
        ];
        dots[id as usize].name = name.to_string();
        let mut tree = DotTree::from_dots(dots).expect("tree");

        assert_eq!(
            Err(RouteError::InvalidName {
                id,
                name: name.to_string()
            }),
            tree.generate_routes()
        );
    }
}
