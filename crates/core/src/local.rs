use crate::models::Item;
use crate::traits::LocalState;
use std::path::{Path, PathBuf};

const MAX_FILENAME: usize = 255;
const MEDIA_EXTENSION: &str = "mpeg";
const PLACEHOLDER: &str = "_";

/// Make a server-supplied title safe to use as a single path component
pub fn sanitize_filename(name: &str) -> String {
    let mut result: String = name
        .trim()
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .map(|c| if c == ' ' || c == '\t' { '_' } else { c })
        .filter(|c| !c.is_control())
        .collect();

    // Never `.`/`..` or empty, so the name stays a single child of its parent
    if result.chars().all(|c| c == '.') {
        return PLACEHOLDER.to_string();
    }

    if result.len() > MAX_FILENAME {
        let mut cut = MAX_FILENAME;
        while !result.is_char_boundary(cut) {
            cut -= 1;
        }
        result.truncate(cut);
    }
    result
}

/// File name an item is saved under
pub fn item_file_name(item: &Item) -> String {
    let stem = sanitize_filename(&item.title);
    let max_stem = MAX_FILENAME - MEDIA_EXTENSION.len() - 1;
    let stem = if stem.len() > max_stem {
        let mut cut = max_stem;
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        &stem[..cut]
    } else {
        &stem[..]
    };
    format!("{}.{}", stem, MEDIA_EXTENSION)
}

/// The destination tree recordings are saved into: `<root>/<folder>/<item>.mpeg`
#[derive(Clone, Debug)]
pub struct SaveDirectory {
    root: PathBuf,
}

impl SaveDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn folder_path(&self, folder_title: &str) -> PathBuf {
        self.root.join(sanitize_filename(folder_title))
    }

    pub fn item_path(&self, folder_title: &str, item: &Item) -> PathBuf {
        self.folder_path(folder_title).join(item_file_name(item))
    }
}

impl LocalState for SaveDirectory {
    fn exists(&self, folder_title: &str, item: &Item) -> bool {
        self.item_path(folder_title, item).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemKind;

    fn item(title: &str) -> Item {
        Item {
            id: "1".to_string(),
            parent_id: "f".to_string(),
            title: title.to_string(),
            parent_folder: "Show".to_string(),
            url: String::new(),
            size_bytes: None,
            duration_seconds: None,
            kind: ItemKind::from_title(title),
            description: String::new(),
            is_recording: false,
        }
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("  S4 E12: Pilot?  "), "S4_E12_Pilot");
        assert_eq!(sanitize_filename("A/B\\C|D*E\"F<G>"), "ABCDEFG");
        assert_eq!(sanitize_filename("tab\there"), "tab_here");
    }

    #[test]
    fn test_sanitize_never_yields_relative_components() {
        assert_eq!(sanitize_filename(".."), "_");
        assert_eq!(sanitize_filename(" . "), "_");
        assert_eq!(sanitize_filename("???"), "_");
        assert_eq!(sanitize_filename(""), "_");
        assert_eq!(sanitize_filename("News\u{0}\r\n"), "News");
        assert_eq!(sanitize_filename("..Hidden"), "..Hidden");
    }

    #[test]
    fn test_dotdot_folder_stays_under_root() {
        let dir = SaveDirectory::new("/media/fetch");
        let path = dir.item_path("..", &item(".."));
        assert_eq!(path, PathBuf::from("/media/fetch/_/_.mpeg"));
        assert!(path.starts_with(dir.root()));
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let cleaned = sanitize_filename(&long);
        assert!(cleaned.len() <= 255);
        assert!(cleaned.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_item_path_layout() {
        let dir = SaveDirectory::new("/media/fetch");
        let path = dir.item_path("2 Broke Girls", &item("S4 E12"));
        assert_eq!(path, PathBuf::from("/media/fetch/2_Broke_Girls/S4_E12.mpeg"));
    }

    #[test]
    fn test_long_titles_keep_extension() {
        let name = item_file_name(&item(&"x".repeat(400)));
        assert!(name.len() <= 255);
        assert!(name.ends_with(".mpeg"));
    }
}
