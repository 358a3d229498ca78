use crate::models::{Container, FilterCriteria, Item, RecordingSet, Show};
use crate::traits::LocalState;

/// Case-insensitive substring match of `text` against any of `terms`
pub fn matches_any(text: &str, terms: &[String]) -> bool {
    let text = text.to_lowercase();
    terms
        .iter()
        .any(|term| text.contains(&term.trim().to_lowercase()))
}

/// Folder passes `--folder` (if any) and is not hit by `--exclude`
///
/// Exclusion always wins over inclusion.
pub fn folder_allowed(folder: &Container, criteria: &FilterCriteria) -> bool {
    if !criteria.folder_exclude.is_empty() && matches_any(&folder.title, &criteria.folder_exclude) {
        return false;
    }
    criteria.folder_include.is_empty() || matches_any(&folder.title, &criteria.folder_include)
}

/// Item-level predicates: title, "new" and "currently recording"
pub fn item_allowed(
    folder: &Container,
    item: &Item,
    criteria: &FilterCriteria,
    local: &dyn LocalState,
) -> bool {
    if !criteria.title_include.is_empty() && !matches_any(&item.title, &criteria.title_include) {
        return false;
    }
    if criteria.new_only && local.exists(&folder.title, item) {
        tracing::debug!("Already saved: {} / {}", folder.title, item.title);
        return false;
    }
    if criteria.recording_in_progress_only && !item.is_recording {
        return false;
    }
    true
}

/// Apply `criteria` to a walked recording set
///
/// Folder and item ordering is preserved. Folders emptied by an item-level
/// predicate are dropped; with no item-level predicate active, folders pass
/// through untouched. Show listings only ever apply the folder predicates.
pub fn filter(set: &RecordingSet, criteria: &FilterCriteria, local: &dyn LocalState) -> RecordingSet {
    let item_filter = criteria.has_item_filter() && !criteria.shows_only;
    let mut shows = Vec::with_capacity(set.shows.len());

    for show in &set.shows {
        if !folder_allowed(&show.folder, criteria) {
            tracing::debug!("Folder filtered out: {}", show.folder.title);
            continue;
        }

        if show.error.is_some() || criteria.shows_only {
            shows.push(show.clone());
            continue;
        }

        let items: Vec<Item> = show
            .items
            .iter()
            .filter(|item| item_allowed(&show.folder, item, criteria, local))
            .cloned()
            .collect();

        if item_filter && items.is_empty() {
            continue;
        }

        shows.push(Show::new(show.folder.clone(), items));
    }

    RecordingSet::new(shows)
}

/// A `LocalState` that knows nothing has been saved
#[derive(Clone, Copy, Debug, Default)]
pub struct NothingSaved;

impl LocalState for NothingSaved {
    fn exists(&self, _folder_title: &str, _item: &Item) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemKind;
    use std::collections::HashSet;

    struct Snapshot(HashSet<(String, String)>);

    impl LocalState for Snapshot {
        fn exists(&self, folder_title: &str, item: &Item) -> bool {
            self.0
                .contains(&(folder_title.to_string(), item.title.clone()))
        }
    }

    fn folder(id: &str, title: &str) -> Container {
        Container {
            id: id.to_string(),
            parent_id: "recordings".to_string(),
            title: title.to_string(),
            child_count: None,
        }
    }

    fn item(folder: &Container, id: &str, title: &str, is_recording: bool) -> Item {
        Item {
            id: id.to_string(),
            parent_id: folder.id.clone(),
            title: title.to_string(),
            parent_folder: folder.title.clone(),
            url: format!("http://10.0.0.5:49152/web/{}.mpeg", id),
            size_bytes: Some(1000),
            duration_seconds: Some(60),
            kind: ItemKind::from_title(title),
            description: String::new(),
            is_recording,
        }
    }

    fn sample_set() -> RecordingSet {
        let girls = folder("f1", "2 Broke Girls");
        let news = folder("f2", "News");
        RecordingSet::new(vec![
            Show::new(
                girls.clone(),
                vec![
                    item(&girls, "i1", "S4 E12", false),
                    item(&girls, "i2", "S4 E13", false),
                    item(&girls, "i3", "S4 E14", true),
                ],
            ),
            Show::new(news.clone(), vec![item(&news, "i4", "Evening News", false)]),
        ])
    }

    fn titles(set: &RecordingSet) -> Vec<String> {
        set.items().map(|(_, i)| i.title.clone()).collect()
    }

    #[test]
    fn test_empty_criteria_is_identity() {
        let set = sample_set();
        let filtered = filter(&set, &FilterCriteria::default(), &NothingSaved);
        assert_eq!(filtered, set);
    }

    #[test]
    fn test_identity_keeps_empty_folders() {
        let set = RecordingSet::new(vec![Show::new(folder("f9", "Empty Show"), vec![])]);
        let filtered = filter(&set, &FilterCriteria::default(), &NothingSaved);
        assert_eq!(filtered, set);
    }

    #[test]
    fn test_folder_and_title_scenario() {
        let criteria = FilterCriteria {
            folder_include: vec!["2 Broke Girls".to_string()],
            title_include: vec!["S4 E12".to_string(), " S4 E13".to_string()],
            ..Default::default()
        };
        let filtered = filter(&sample_set(), &criteria, &NothingSaved);

        assert_eq!(titles(&filtered), vec!["S4 E12", "S4 E13"]);
        assert!(filtered.shows.iter().all(|s| s.folder.title != "News"));
    }

    #[test]
    fn test_exclusion_dominates_inclusion() {
        let criteria = FilterCriteria {
            folder_include: vec!["broke".to_string(), "news".to_string()],
            folder_exclude: vec!["BROKE".to_string()],
            ..Default::default()
        };
        let filtered = filter(&sample_set(), &criteria, &NothingSaved);
        assert_eq!(titles(&filtered), vec!["Evening News"]);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let criteria = FilterCriteria {
            title_include: vec!["evening".to_string()],
            ..Default::default()
        };
        let filtered = filter(&sample_set(), &criteria, &NothingSaved);
        assert_eq!(titles(&filtered), vec!["Evening News"]);
        assert_eq!(filtered.shows.len(), 1);
    }

    #[test]
    fn test_new_only_skips_existing_and_is_idempotent() {
        let snapshot = Snapshot(HashSet::from([(
            "2 Broke Girls".to_string(),
            "S4 E12".to_string(),
        )]));
        let criteria = FilterCriteria {
            folder_include: vec!["2 Broke Girls".to_string()],
            new_only: true,
            ..Default::default()
        };

        let once = filter(&sample_set(), &criteria, &snapshot);
        assert_eq!(titles(&once), vec!["S4 E13", "S4 E14"]);

        let twice = filter(&once, &criteria, &snapshot);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_recording_in_progress_only() {
        let criteria = FilterCriteria {
            recording_in_progress_only: true,
            ..Default::default()
        };
        let filtered = filter(&sample_set(), &criteria, &NothingSaved);
        assert_eq!(titles(&filtered), vec!["S4 E14"]);
        assert_eq!(filtered.shows.len(), 1);
    }

    #[test]
    fn test_failed_folder_is_kept_unless_excluded() {
        let mut set = sample_set();
        set.shows.push(Show::failed(folder("f3", "Movies"), "HTTP 500"));

        let kept = filter(&set, &FilterCriteria::default(), &NothingSaved);
        assert_eq!(kept.failed_folders().count(), 1);

        let criteria = FilterCriteria {
            folder_exclude: vec!["movies".to_string()],
            ..Default::default()
        };
        let dropped = filter(&set, &criteria, &NothingSaved);
        assert_eq!(dropped.failed_folders().count(), 0);
    }

    #[test]
    fn test_shows_only_keeps_matching_folders_without_items() {
        let set = RecordingSet::new(vec![
            Show::new(folder("f1", "2 Broke Girls"), vec![]),
            Show::new(folder("f2", "News"), vec![]),
        ]);
        let criteria = FilterCriteria {
            folder_include: vec!["girls".to_string()],
            shows_only: true,
            ..Default::default()
        };
        let filtered = filter(&set, &criteria, &NothingSaved);
        assert_eq!(filtered.shows.len(), 1);
        assert_eq!(filtered.shows[0].folder.title, "2 Broke Girls");
    }

    #[test]
    fn test_shows_only_ignores_item_predicates() {
        let set = RecordingSet::new(vec![
            Show::new(folder("f1", "2 Broke Girls"), vec![]),
            Show::new(folder("f2", "News"), vec![]),
        ]);
        let criteria = FilterCriteria {
            folder_exclude: vec!["news".to_string()],
            title_include: vec!["S4 E12".to_string()],
            new_only: true,
            recording_in_progress_only: true,
            shows_only: true,
            ..Default::default()
        };
        let everything_saved = Snapshot(HashSet::new());
        let filtered = filter(&set, &criteria, &everything_saved);

        let titles: Vec<&str> = filtered.shows.iter().map(|s| s.folder.title.as_str()).collect();
        assert_eq!(titles, vec!["2 Broke Girls"]);
    }
}
