// src/messages.rs
//
// Notification templates. Placeholders are written `{name}` and filled by
// `render`; a placeholder with no value is left in the text as-is.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const DEFAULT_LANGUAGE: &str = "en";

type TemplateTable = HashMap<&'static str, HashMap<&'static str, &'static str>>;

static TEMPLATES: Lazy<TemplateTable> = Lazy::new(|| {
    let mut table: TemplateTable = HashMap::new();

    table.insert(
        "en",
        HashMap::from([
            (
                "draft_starting_soon",
                "⏳ **Draft starting soon!**\n\n\
                The draft for **{league}** starts in {minutes} minutes.\n\
                Get your rankings ready!",
            ),
            (
                "draft_your_turn",
                "🚨 **You're on the clock!**\n\n\
                League: **{league}**\n\
                Round {round}, pick {pick} (overall #{overall})\n\
                Pick timer: {timer}",
            ),
            (
                "waiver_reminder",
                "📋 **Waivers process tonight**\n\n\
                Don't forget to submit your claims for: {leagues}",
            ),
            ("team_management_title", "🛠 **Weekly lineup check**"),
            ("team_management_injuries", "🚑 **Injured players:**"),
            ("team_management_byes", "😴 **Teams on bye:**"),
            ("team_management_all_clear", "✅ No injuries or byes on your rosters this week."),
            ("game_day_title", "🏈 **Game day!**"),
            ("game_day_players", "Your players in action today:"),
            ("game_day_games", "Today's games:"),
            ("and_more", "…and {count} more"),
        ]),
    );

    table.insert(
        "es",
        HashMap::from([
            (
                "draft_starting_soon",
                "⏳ **¡El draft empieza pronto!**\n\n\
                El draft de **{league}** empieza en {minutes} minutos.\n\
                ¡Prepara tus rankings!",
            ),
            (
                "draft_your_turn",
                "🚨 **¡Te toca elegir!**\n\n\
                Liga: **{league}**\n\
                Ronda {round}, selección {pick} (general #{overall})\n\
                Tiempo por selección: {timer}",
            ),
            (
                "waiver_reminder",
                "📋 **Los waivers se procesan esta noche**\n\n\
                No olvides enviar tus solicitudes para: {leagues}",
            ),
            ("team_management_title", "🛠 **Revisión semanal de alineación**"),
            ("team_management_injuries", "🚑 **Jugadores lesionados:**"),
            ("team_management_byes", "😴 **Equipos en semana de descanso:**"),
            ("team_management_all_clear", "✅ Sin lesiones ni descansos esta semana."),
            ("game_day_title", "🏈 **¡Día de partido!**"),
            ("game_day_players", "Tus jugadores hoy:"),
            ("game_day_games", "Partidos de hoy:"),
            ("and_more", "…y {count} más"),
        ]),
    );

    table
});

/// Template text for a language, falling back to English
pub fn template(language: &str, key: &str) -> Option<&'static str> {
    let language = language.to_lowercase();
    TEMPLATES
        .get(language.as_str())
        .and_then(|t| t.get(key))
        .or_else(|| TEMPLATES.get(DEFAULT_LANGUAGE).and_then(|t| t.get(key)))
        .copied()
}

/// Characters that start or end markup in chat messages
const MARKUP_CHARS: [char; 8] = ['\\', '*', '_', '`', '[', ']', '~', '|'];

/// Backslash-escape markup characters so user data renders literally
pub fn escape_markdown(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if MARKUP_CHARS.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Substitute `{name}` placeholders; values are escaped as literal text
pub fn render(template: &str, variables: &[(&str, String)]) -> String {
    variables
        .iter()
        .fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("{{{}}}", name), &escape_markdown(value))
        })
}

/// Look up and render a template; unknown keys render as the key itself
pub fn localize(language: &str, key: &str, variables: &[(&str, String)]) -> String {
    match template(language, key) {
        Some(text) => render(text, variables),
        None => {
            tracing::warn!("Missing template '{}' for language '{}'", key, language);
            key.to_string()
        }
    }
}

pub fn supported_languages() -> Vec<&'static str> {
    let mut languages: Vec<&'static str> = TEMPLATES.keys().copied().collect();
    languages.sort_unstable();
    languages
}

/// Human-readable pick timer, e.g. "90 seconds" or "2 hours"
pub fn format_pick_timer(seconds: u32) -> String {
    match seconds {
        0 => "no limit".to_string(),
        s if s % 3600 == 0 => plural(s / 3600, "hour"),
        s if s >= 60 && s % 60 == 0 => plural(s / 60, "minute"),
        s => plural(s, "second"),
    }
}

fn plural(n: u32, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}
