//! Per-user locations and the mpv binary lookup.

use std::path::PathBuf;

const APP_DIR: &str = "vara";

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(std::env::temp_dir)
}

/// Logs, persisted state and mpv's stderr. `~/.local/share/vara` on unix.
pub fn data_dir() -> PathBuf {
    if cfg!(unix) {
        home().join(".local").join("share").join(APP_DIR)
    } else {
        dirs::data_local_dir().unwrap_or_else(home).join(APP_DIR)
    }
}

/// Holds `config.toml`. `~/.config/vara` on unix.
pub fn config_dir() -> PathBuf {
    if cfg!(unix) {
        home().join(".config").join(APP_DIR)
    } else {
        dirs::config_dir().unwrap_or_else(home).join(APP_DIR)
    }
}

pub fn default_downloads_dir() -> PathBuf {
    dirs::audio_dir()
        .unwrap_or_else(|| home().join("Music"))
        .join(APP_DIR)
}

pub fn mpv_socket_path() -> PathBuf {
    std::env::temp_dir().join("vara-mpv.sock")
}

pub fn mpv_socket_arg() -> String {
    format!("--input-ipc-server={}", mpv_socket_path().display())
}

/// `MPV_PATH` if it exists, then a copy next to our executable, then `PATH`.
pub fn find_mpv_binary() -> Option<PathBuf> {
    let name = if cfg!(windows) { "mpv.exe" } else { "mpv" };

    let from_env = std::env::var_os("MPV_PATH").map(PathBuf::from);
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(name)));
    let on_path = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).map(|dir| dir.join(name)).collect())
        .unwrap_or_else(Vec::new);

    from_env
        .into_iter()
        .chain(beside_exe)
        .chain(on_path)
        .find(|candidate| candidate.is_file())
}
