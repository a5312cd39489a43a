//! Line-oriented front end: word commands in, one-line summaries out.

use reqwest::Url;

use vara_proto::model::{License, Plan};
use vara_proto::protocol::{
    AppSnapshot, Command, Notification, Page, PlaybackStatus, Severity, ViewKind, ViewState,
};

pub const HELP: &str = "\
commands:
  play <id> | toggle [id] | seek <0-100> | vol <0-1> | mute | next | prev | close
  tab <view> | open <view> | open genre|subgenre|instrument|mood <id> [title] | back
  go <path> | search <words> | focus | visible | refresh | state
  fav <id> | download <id> | verify <licence id> | youtube <link>
  login | logout | ask <prompt> | licences | quit
  plans | order <plan id> | pay <payment id> <signature> | buy <plan id> (dev)
  or a JSON command, e.g. {\"cmd\":\"play_song\",\"song_id\":\"abc123\"}";

/// Parses one input line. `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line.starts_with('{') {
        return serde_json::from_str(line)
            .map(Some)
            .map_err(|e| format!("bad JSON command: {}", e));
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let need = |what: &str| -> Result<String, String> {
        if rest.is_empty() {
            Err(format!("{} needs {}", word, what))
        } else {
            Ok(rest.to_string())
        }
    };

    let cmd = match word {
        "play" => Command::PlaySong {
            song_id: need("a song id")?,
        },
        "toggle" | "pause" => Command::TogglePlayPause {
            song_id: (!rest.is_empty()).then(|| rest.to_string()),
            queue: None,
        },
        "seek" => Command::Seek {
            percent: rest.parse().map_err(|_| "seek needs a number 0-100".to_string())?,
        },
        "vol" | "volume" => {
            let v: f32 = rest.parse().map_err(|_| "vol needs a number".to_string())?;
            Command::Volume {
                value: if v > 1.0 { v / 100.0 } else { v },
            }
        }
        "mute" => Command::ToggleMute,
        "next" => Command::Next,
        "prev" => Command::Prev,
        "close" => Command::ClosePlayer,
        "tab" => Command::TabClick {
            tab: parse_kind(&need("a view name")?)?,
        },
        "open" => Command::OpenView {
            view: parse_view(&need("a view")?)?,
        },
        "back" => Command::Back,
        "go" => Command::Navigate {
            path: need("a path")?,
        },
        "search" => Command::Navigate {
            path: search_path(rest),
        },
        "focus" => Command::WindowFocused,
        "visible" => Command::PageVisible,
        "fav" => Command::ToggleFavorite {
            song_id: need("a song id")?,
        },
        "download" | "dl" => Command::Download {
            song_id: need("a song id")?,
        },
        "login" => Command::Login,
        "logout" => Command::Logout,
        "ask" => Command::Recommend {
            prompt: rest.to_string(),
        },
        "verify" => Command::VerifyLicense {
            license_id: need("a licence id")?,
        },
        "youtube" => Command::SetYoutubeChannel {
            link: need("a link")?,
        },
        "refresh" => Command::Refresh,
        "state" => Command::GetState,
        other => return Err(format!("unknown command {:?} (try help)", other)),
    };
    Ok(Some(cmd))
}

fn parse_kind(s: &str) -> Result<ViewKind, String> {
    let normalised = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
    let alias = match normalised.as_str() {
        "home" | "foryou" => "for-you",
        "genres" => "all-genres",
        "subgenres" | "sub-genres" => "all-sub-genres",
        "instruments" => "all-instruments",
        "moods" => "all-moods",
        "free" => "free-songs",
        "favorites" | "favs" => "favourites",
        other => other,
    };
    ViewKind::parse(alias).ok_or_else(|| format!("unknown view {:?}", s))
}

fn parse_view(spec: &str) -> Result<ViewState, String> {
    let mut parts = spec.splitn(3, char::is_whitespace);
    let head = parts.next().unwrap_or_default();
    let id = parts.next().map(str::to_string);
    let title = parts.next().map(str::trim).unwrap_or_default().to_string();

    let with_id = |make: fn(String, String) -> ViewState| -> Result<ViewState, String> {
        let id = id.clone().ok_or_else(|| format!("open {} needs an id", head))?;
        let title = if title.is_empty() { id.clone() } else { title.clone() };
        Ok(make(id, title))
    };

    match head {
        "genre" => with_id(|id, t| ViewState::sub_genres_of(id, t)),
        "subgenre" | "sub-genre" => with_id(|id, t| ViewState::songs_of_sub_genre(id, t)),
        "instrument" => with_id(|id, t| ViewState::songs_of_instrument(id, t)),
        "mood" => with_id(|id, t| ViewState::songs_of_mood(id, t)),
        _ => parse_kind(spec).map(ViewState::top),
    }
}

fn search_path(query: &str) -> String {
    match Url::parse_with_params("http://vara.local/search", &[("q", query)]) {
        Ok(url) => format!("{}?{}", url.path(), url.query().unwrap_or_default()),
        Err(_) => "/search".to_string(),
    }
}

fn clock(secs: f64) -> String {
    let secs = if secs.is_finite() { secs.max(0.0) as u64 } else { 0 };
    format!("{}:{:02}", secs / 60, secs % 60)
}

pub fn summary(s: &AppSnapshot) -> String {
    let page = match &s.page {
        Page::Home => "home".to_string(),
        Page::Search => format!("search {:?}", s.search_query.as_deref().unwrap_or_default()),
        Page::Login => "login".to_string(),
        Page::Premium => "premium".to_string(),
        Page::Ai => "assistant".to_string(),
        Page::Info(slug) => slug.clone(),
        Page::NotFound => "not found".to_string(),
    };

    let mut line = format!(
        "[{}] {} | {} | {} ({}) depth {}",
        s.rev,
        s.url,
        page,
        s.view.title,
        s.view_len,
        s.nav_depth
    );

    let p = &s.playback;
    if let Some(title) = &p.title {
        let state = match p.status {
            PlaybackStatus::Loading => "loading",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Idle => "idle",
        };
        let total = p.duration.map(clock).unwrap_or_else(|| "?".into());
        line.push_str(&format!(
            " | {} {} {}/{}",
            state,
            title,
            clock(p.current_time),
            total
        ));
    }
    line.push_str(&format!(" | vol {:.0}%", p.volume * 100.0));

    match &s.user {
        Some(u) => {
            let plan = if u.is_premium { "premium" } else { "free" };
            line.push_str(&format!(" | {} ({})", u.email, plan));
            if let Some(limits) = &s.download_limits {
                line.push_str(&format!(" {} left", limits.remaining));
            }
        }
        None => line.push_str(" | logged out"),
    }
    if s.overlay_visible {
        line.push_str(" | busy");
    }
    line
}

pub fn plan_line(plan: &Plan) -> String {
    let days = plan
        .duration_days
        .map(|d| format!(" / {} days", d))
        .unwrap_or_default();
    format!("{}  {}  {}{}", plan.id, plan.name, money(plan.amount, &plan.currency), days)
}

/// Amounts arrive in minor units (paise, cents).
pub fn money(amount: u64, currency: &str) -> String {
    format!("{}.{:02} {}", amount / 100, amount % 100, currency)
}

/// Account words the shell runs itself instead of sending to the core.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountAction {
    Plans,
    /// Create a gateway order for a plan.
    Order(String),
    /// Confirm the pending order with the gateway's payment proof.
    Pay {
        payment_id: String,
        signature: String,
    },
    /// Dev-mode purchase.
    Buy(String),
    Licences,
}

/// `None` when the line is not an account word.
pub fn parse_account(line: &str) -> Option<Result<AccountAction, String>> {
    let mut words = line.split_whitespace();
    let word = words.next()?;
    let args: Vec<&str> = words.collect();
    let action = match (word, args.as_slice()) {
        ("plans", []) => Ok(AccountAction::Plans),
        ("licences" | "licenses", []) => Ok(AccountAction::Licences),
        ("order", [plan]) => Ok(AccountAction::Order(plan.to_string())),
        ("buy", [plan]) => Ok(AccountAction::Buy(plan.to_string())),
        ("pay", [payment_id, signature]) => Ok(AccountAction::Pay {
            payment_id: payment_id.to_string(),
            signature: signature.to_string(),
        }),
        ("order" | "buy", _) => Err(format!("{} needs a plan id", word)),
        ("pay", _) => Err("pay needs <payment id> <signature>".to_string()),
        _ => return None,
    };
    Some(action)
}

pub fn license_line(license: &License) -> String {
    let song = license
        .song_title
        .as_deref()
        .or(license.song_id.as_deref())
        .unwrap_or("-");
    match license.issued_at {
        Some(at) => format!("{}  {}  {}", license.license_id, song, at.format("%Y-%m-%d")),
        None => format!("{}  {}", license.license_id, song),
    }
}

pub fn notification_line(n: &Notification) -> String {
    let tag = match n.severity {
        Severity::Info => "info",
        Severity::Success => "ok",
        Severity::Warning => "warn",
        Severity::Error => "error",
    };
    format!("({}) {}", tag, n.message)
}
