//! Property-based tests for destination path normalization.

#[cfg(test)]
mod proptest_tests {
    use std::path::{Path, PathBuf};

    use crate::layout::{destination_path, group_vars_to_variables, strip_roles, LAYER_NAMES};
    use proptest::prelude::*;

    fn layer() -> impl Strategy<Value = &'static str> {
        proptest::sample::select(LAYER_NAMES.to_vec())
    }

    // Segments that never collide with the normalized names.
    fn segment() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,8}".prop_filter("reserved segment", |s| {
            s != "roles" && s != "group_vars" && s != "src" && !LAYER_NAMES.contains(&s.as_str())
        })
    }

    fn plain_path() -> impl Strategy<Value = String> {
        prop::collection::vec(segment(), 1..5).prop_map(|parts| parts.join("/"))
    }

    proptest! {
        /// Property: paths without reserved segments are untouched
        #[test]
        fn plain_paths_are_unchanged(path in plain_path(), modern in any::<bool>()) {
            prop_assert_eq!(destination_path(Path::new(&path), modern), PathBuf::from(&path));
        }

        /// Property: legacy layer paths land under src/
        #[test]
        fn legacy_layer_paths_move_to_src(layer in layer(), rest in plain_path()) {
            let path = format!("{}/{}", layer, rest);
            prop_assert_eq!(destination_path(Path::new(&path), false), Path::new("src").join(&path));
        }

        /// Property: modern layer paths keep their location
        #[test]
        fn modern_layer_paths_stay(layer in layer(), rest in plain_path()) {
            let path = format!("src/{}/{}", layer, rest);
            prop_assert_eq!(destination_path(Path::new(&path), true), PathBuf::from(&path));
        }

        /// Property: strip_roles removes exactly one segment
        #[test]
        fn strip_roles_removes_one_segment(prefix in plain_path(), rest in plain_path()) {
            let path = format!("{}/roles/{}", prefix, rest);
            let stripped = strip_roles(Path::new(&path));
            prop_assert_eq!(
                stripped.components().count(),
                Path::new(&path).components().count() - 1
            );
            prop_assert_eq!(stripped, Path::new(&prefix).join(&rest));
        }

        /// Property: group_vars renaming keeps the segment count
        #[test]
        fn group_vars_rename_keeps_depth(prefix in plain_path(), rest in plain_path()) {
            let path = format!("{}/group_vars/{}", prefix, rest);
            let renamed = group_vars_to_variables(Path::new(&path));
            prop_assert_eq!(renamed.components().count(), Path::new(&path).components().count());
            prop_assert!(renamed.iter().any(|segment| segment == "variables"));
        }

        /// Property: normalization is deterministic
        #[test]
        fn destination_path_is_deterministic(path in "[a-z/_]{0,40}", modern in any::<bool>()) {
            let path = Path::new(&path);
            prop_assert_eq!(destination_path(path, modern), destination_path(path, modern));
        }
    }
}
