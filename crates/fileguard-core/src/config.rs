//! Typed access to the preference store.
//!
//! Every getter reads through to the store and falls back to its default,
//! so settings come into existence lazily on first read. Set-valued entries
//! are replaced wholesale on every mutation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::paths::default_home_dir;
use crate::prefs::PreferenceStore;
use crate::settings::{
    Mechanism, ProtectionSettings, ALL_TABS_MASK, SORT_BY_NAME, SORT_DESCENDING, VIEW_TYPE_GRID,
};

pub const PROTECTION_ENABLED: &str = "protection_enabled";
pub const PROTECTION_TYPE: &str = "protection_type";
pub const PROTECTION_PIN: &str = "protection_pin";
pub const PROTECTED_ITEMS: &str = "protected_items";

pub const SHOW_HIDDEN: &str = "show_hidden";
pub const TEMPORARILY_SHOW_HIDDEN: &str = "temporarily_show_hidden";
pub const PRESS_BACK_TWICE: &str = "press_back_twice";
pub const HOME_FOLDER: &str = "home_folder";
pub const FAVORITES: &str = "favorites";
pub const IS_ROOT_AVAILABLE: &str = "is_root_available";
pub const ENABLE_ROOT_ACCESS: &str = "enable_root_access";
pub const EDITOR_TEXT_ZOOM: &str = "editor_text_zoom";
pub const VIEW_TYPE: &str = "view_type";
pub const VIEW_TYPE_PREFIX: &str = "view_type_folder_";
pub const SORT_ORDER: &str = "sort_order";
pub const SORT_FOLDER_PREFIX: &str = "sort_folder_";
pub const FILE_COLUMN_CNT: &str = "file_column_cnt";
pub const FILE_LANDSCAPE_COLUMN_CNT: &str = "file_landscape_column_cnt";
pub const DISPLAY_FILE_NAMES: &str = "display_file_names";
pub const SHOW_TABS: &str = "show_tabs";
pub const WAS_STORAGE_ANALYSIS_TAB_ADDED: &str = "was_storage_analysis_tab_added";
pub const ENABLE_SHAKE_TOGGLE_SORTING: &str = "enable_shake_toggle_sorting";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

#[derive(Clone)]
pub struct Config {
    prefs: Arc<dyn PreferenceStore>,
    default_home: PathBuf,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("default_home", &self.default_home)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn new(prefs: Arc<dyn PreferenceStore>) -> Self {
        Self::with_default_home(prefs, default_home_dir())
    }

    pub fn with_default_home(prefs: Arc<dyn PreferenceStore>, default_home: PathBuf) -> Self {
        Self {
            prefs,
            default_home,
        }
    }

    pub fn prefs(&self) -> &Arc<dyn PreferenceStore> {
        &self.prefs
    }

    // --- protection ---

    pub fn is_protection_enabled(&self) -> bool {
        self.prefs.get_bool(PROTECTION_ENABLED, true)
    }

    pub fn set_protection_enabled(&self, enabled: bool) {
        self.prefs.set_bool(PROTECTION_ENABLED, enabled);
    }

    pub fn mechanism(&self) -> Mechanism {
        Mechanism::from_code(
            self.prefs
                .get_int(PROTECTION_TYPE, Mechanism::Biometric.code()),
        )
    }

    pub fn set_mechanism(&self, mechanism: Mechanism) {
        self.prefs.set_int(PROTECTION_TYPE, mechanism.code());
    }

    pub fn protection_pin(&self) -> String {
        self.prefs.get_string(PROTECTION_PIN, "")
    }

    pub fn set_protection_pin(&self, pin: &str) {
        self.prefs.set_string(PROTECTION_PIN, pin);
    }

    pub fn protected_items(&self) -> BTreeSet<String> {
        self.prefs.get_string_set(PROTECTED_ITEMS)
    }

    pub fn set_protected_items(&self, items: BTreeSet<String>) {
        self.prefs.set_string_set(PROTECTED_ITEMS, items);
    }

    /// Protected only while protection is globally on.
    pub fn is_protected(&self, path: &str) -> bool {
        self.is_protection_enabled() && self.protected_items().contains(path)
    }

    pub fn add_protected(&self, path: &str) {
        let mut items = self.protected_items();
        if items.insert(path.to_string()) {
            debug!(path, "item protected");
        }
        self.set_protected_items(items);
    }

    pub fn remove_protected(&self, path: &str) {
        let mut items = self.protected_items();
        if items.remove(path) {
            debug!(path, "item unprotected");
        }
        self.set_protected_items(items);
    }

    pub fn protection_settings(&self) -> ProtectionSettings {
        ProtectionSettings {
            enabled: self.is_protection_enabled(),
            mechanism: self.mechanism(),
            pin: self.protection_pin(),
            protected_paths: self.protected_items(),
        }
    }

    // --- hidden files ---

    pub fn show_hidden(&self) -> bool {
        self.prefs.get_bool(SHOW_HIDDEN, false)
    }

    pub fn set_show_hidden(&self, show: bool) {
        self.prefs.set_bool(SHOW_HIDDEN, show);
    }

    pub fn temporarily_show_hidden(&self) -> bool {
        self.prefs.get_bool(TEMPORARILY_SHOW_HIDDEN, false)
    }

    pub fn set_temporarily_show_hidden(&self, show: bool) {
        self.prefs.set_bool(TEMPORARILY_SHOW_HIDDEN, show);
    }

    pub fn should_show_hidden(&self) -> bool {
        self.show_hidden() || self.temporarily_show_hidden()
    }

    // --- misc flags ---

    pub fn press_back_twice(&self) -> bool {
        self.prefs.get_bool(PRESS_BACK_TWICE, true)
    }

    pub fn set_press_back_twice(&self, value: bool) {
        self.prefs.set_bool(PRESS_BACK_TWICE, value);
    }

    pub fn is_root_available(&self) -> bool {
        self.prefs.get_bool(IS_ROOT_AVAILABLE, false)
    }

    pub fn set_root_available(&self, value: bool) {
        self.prefs.set_bool(IS_ROOT_AVAILABLE, value);
    }

    pub fn enable_root_access(&self) -> bool {
        self.prefs.get_bool(ENABLE_ROOT_ACCESS, false)
    }

    pub fn set_enable_root_access(&self, value: bool) {
        self.prefs.set_bool(ENABLE_ROOT_ACCESS, value);
    }

    pub fn editor_text_zoom(&self) -> f32 {
        self.prefs.get_float(EDITOR_TEXT_ZOOM, 1.2)
    }

    pub fn set_editor_text_zoom(&self, zoom: f32) {
        self.prefs.set_float(EDITOR_TEXT_ZOOM, zoom);
    }

    pub fn display_filenames(&self) -> bool {
        self.prefs.get_bool(DISPLAY_FILE_NAMES, true)
    }

    pub fn set_display_filenames(&self, value: bool) {
        self.prefs.set_bool(DISPLAY_FILE_NAMES, value);
    }

    pub fn show_tabs(&self) -> i32 {
        self.prefs.get_int(SHOW_TABS, ALL_TABS_MASK)
    }

    pub fn set_show_tabs(&self, mask: i32) {
        self.prefs.set_int(SHOW_TABS, mask);
    }

    pub fn was_storage_analysis_tab_added(&self) -> bool {
        self.prefs.get_bool(WAS_STORAGE_ANALYSIS_TAB_ADDED, false)
    }

    pub fn set_storage_analysis_tab_added(&self, value: bool) {
        self.prefs.set_bool(WAS_STORAGE_ANALYSIS_TAB_ADDED, value);
    }

    pub fn enable_shake_toggle_sorting(&self) -> bool {
        self.prefs.get_bool(ENABLE_SHAKE_TOGGLE_SORTING, true)
    }

    pub fn set_enable_shake_toggle_sorting(&self, value: bool) {
        self.prefs.set_bool(ENABLE_SHAKE_TOGGLE_SORTING, value);
    }

    // --- home folder ---

    /// Stored home folder, replaced by the default one when it is unset or
    /// no longer a directory.
    pub fn home_folder(&self) -> String {
        let path = self.prefs.get_string(HOME_FOLDER, "");
        if path.is_empty() || !Path::new(&path).is_dir() {
            let fallback = self.default_home.to_string_lossy().into_owned();
            self.set_home_folder(&fallback);
            return fallback;
        }
        path
    }

    pub fn set_home_folder(&self, path: &str) {
        self.prefs.set_string(HOME_FOLDER, path);
    }

    // --- favorites ---

    pub fn favorites(&self) -> BTreeSet<String> {
        self.prefs.get_string_set(FAVORITES)
    }

    pub fn add_favorite(&self, path: &str) {
        let mut favorites = self.favorites();
        favorites.insert(path.to_string());
        self.prefs.set_string_set(FAVORITES, favorites);
    }

    pub fn move_favorite(&self, old_path: &str, new_path: &str) {
        let mut favorites = self.favorites();
        if !favorites.remove(old_path) {
            return;
        }
        favorites.insert(new_path.to_string());
        self.prefs.set_string_set(FAVORITES, favorites);
    }

    pub fn remove_favorite(&self, path: &str) {
        let mut favorites = self.favorites();
        if !favorites.remove(path) {
            return;
        }
        self.prefs.set_string_set(FAVORITES, favorites);
    }

    // --- view type ---

    pub fn view_type(&self) -> i32 {
        self.prefs.get_int(VIEW_TYPE, VIEW_TYPE_GRID)
    }

    pub fn set_view_type(&self, value: i32) {
        self.prefs.set_int(VIEW_TYPE, value);
    }

    /// An empty path updates the global view type.
    pub fn save_folder_view_type(&self, path: &str, value: i32) {
        if path.is_empty() {
            self.set_view_type(value);
        } else {
            self.prefs.set_int(&folder_key(VIEW_TYPE_PREFIX, path), value);
        }
    }

    pub fn folder_view_type(&self, path: &str) -> i32 {
        self.prefs
            .get_int(&folder_key(VIEW_TYPE_PREFIX, path), self.view_type())
    }

    pub fn remove_folder_view_type(&self, path: &str) {
        self.prefs.remove(&folder_key(VIEW_TYPE_PREFIX, path));
    }

    pub fn has_custom_view_type(&self, path: &str) -> bool {
        self.prefs.contains(&folder_key(VIEW_TYPE_PREFIX, path))
    }

    // --- sorting ---

    pub fn sorting(&self) -> i32 {
        self.prefs.get_int(SORT_ORDER, SORT_BY_NAME)
    }

    pub fn set_sorting(&self, value: i32) {
        self.prefs.set_int(SORT_ORDER, value);
    }

    pub fn folder_sorting(&self, path: &str) -> i32 {
        self.prefs
            .get_int(&folder_key(SORT_FOLDER_PREFIX, path), self.sorting())
    }

    pub fn has_custom_sorting(&self, path: &str) -> bool {
        self.prefs.contains(&folder_key(SORT_FOLDER_PREFIX, path))
    }

    pub fn save_custom_sorting(&self, path: &str, value: i32) {
        if path.is_empty() {
            self.set_sorting(value);
        } else {
            self.prefs
                .set_int(&folder_key(SORT_FOLDER_PREFIX, path), value);
        }
    }

    pub fn remove_custom_sorting(&self, path: &str) {
        self.prefs.remove(&folder_key(SORT_FOLDER_PREFIX, path));
    }

    /// Flip the descending flag for `path`, writing to wherever its sorting
    /// currently comes from. Returns the new value.
    pub fn toggle_sort_order(&self, path: &str) -> i32 {
        let current = self.folder_sorting(path);
        let toggled = if current & SORT_DESCENDING != 0 {
            current & !SORT_DESCENDING
        } else {
            current | SORT_DESCENDING
        };
        if self.has_custom_sorting(path) {
            self.save_custom_sorting(path, toggled);
        } else {
            self.set_sorting(toggled);
        }
        debug!(path, sorting = toggled, "sort order toggled");
        toggled
    }

    // --- grid columns ---

    pub fn file_column_count(&self, orientation: Orientation) -> i32 {
        let (key, default) = column_field(orientation);
        self.prefs.get_int(key, default)
    }

    pub fn set_file_column_count(&self, orientation: Orientation, count: i32) {
        let (key, _) = column_field(orientation);
        self.prefs.set_int(key, count);
    }
}

fn folder_key(prefix: &str, path: &str) -> String {
    format!("{prefix}{}", path.to_lowercase())
}

fn column_field(orientation: Orientation) -> (&'static str, i32) {
    match orientation {
        Orientation::Portrait => (FILE_COLUMN_CNT, 4),
        Orientation::Landscape => (FILE_LANDSCAPE_COLUMN_CNT, 8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryPreferences;
    use tempfile::tempdir;

    fn config() -> Config {
        Config::with_default_home(Arc::new(MemoryPreferences::new()), PathBuf::from("/home/me"))
    }

    #[test]
    fn protection_defaults() {
        let config = config();
        let settings = config.protection_settings();
        assert!(settings.enabled);
        assert_eq!(settings.mechanism, Mechanism::Biometric);
        assert!(settings.pin.is_empty());
        assert!(settings.protected_paths.is_empty());
    }

    #[test]
    fn protect_and_unprotect() {
        let config = config();
        config.add_protected("/x");
        assert!(config.is_protected("/x"));
        assert!(!config.is_protected("/y"));
        config.remove_protected("/x");
        assert!(!config.is_protected("/x"));
    }

    #[test]
    fn disabled_protection_hides_membership() {
        let config = config();
        config.add_protected("/x");
        config.set_protection_enabled(false);
        assert!(!config.is_protected("/x"));
        assert!(config.protected_items().contains("/x"));
    }

    #[test]
    fn favorites_move_only_when_present() {
        let config = config();
        config.add_favorite("/a");
        config.move_favorite("/missing", "/b");
        assert_eq!(config.favorites().len(), 1);
        config.move_favorite("/a", "/b");
        assert!(config.favorites().contains("/b"));
        assert!(!config.favorites().contains("/a"));
        config.remove_favorite("/b");
        assert!(config.favorites().is_empty());
    }

    #[test]
    fn folder_view_type_is_case_insensitive() {
        let config = config();
        config.set_view_type(VIEW_TYPE_GRID);
        config.save_folder_view_type("/Music", 2);
        assert!(config.has_custom_view_type("/music"));
        assert_eq!(config.folder_view_type("/MUSIC"), 2);
        assert_eq!(config.folder_view_type("/other"), VIEW_TYPE_GRID);
        config.remove_folder_view_type("/music");
        assert!(!config.has_custom_view_type("/Music"));
    }

    #[test]
    fn toggle_sort_order_round_trips() {
        let config = config();
        let original = config.sorting();
        assert_ne!(config.toggle_sort_order("/docs") & SORT_DESCENDING, 0);
        assert_eq!(config.toggle_sort_order("/docs"), original);
        assert_eq!(config.sorting(), original);
    }

    #[test]
    fn toggle_sort_order_prefers_custom_sorting() {
        let config = config();
        config.save_custom_sorting("/docs", SORT_BY_NAME);
        config.toggle_sort_order("/docs");
        assert_eq!(config.folder_sorting("/docs"), SORT_BY_NAME | SORT_DESCENDING);
        assert_eq!(config.sorting(), SORT_BY_NAME);
    }

    #[test]
    fn home_folder_falls_back_when_missing() {
        let dir = tempdir().unwrap();
        let config = Config::with_default_home(
            Arc::new(MemoryPreferences::new()),
            dir.path().to_path_buf(),
        );
        config.set_home_folder("/definitely/not/here");
        let home = config.home_folder();
        assert_eq!(home, dir.path().to_string_lossy());
        assert_eq!(config.prefs().get_string(HOME_FOLDER, ""), home);
    }

    #[test]
    fn column_count_defaults_per_orientation() {
        let config = config();
        assert_eq!(config.file_column_count(Orientation::Portrait), 4);
        assert_eq!(config.file_column_count(Orientation::Landscape), 8);
        config.set_file_column_count(Orientation::Landscape, 6);
        assert_eq!(config.file_column_count(Orientation::Landscape), 6);
    }
}
