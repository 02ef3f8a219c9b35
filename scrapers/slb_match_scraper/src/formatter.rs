use chrono::{DateTime, Datelike, Weekday};
use chrono_tz::Tz;

use crate::types::{MatchRecord, UpcomingFixture};

pub const PULHAS: &str = "<:pulhas:867780231116095579>";
pub const SLB: &str = "<:slb:240116451782950914>";

const NUMBER_MARKERS: [&str; 10] = ["1️⃣", "2️⃣", "3️⃣", "4️⃣", "5️⃣", "6️⃣", "7️⃣", "8️⃣", "9️⃣", "🔟"];

pub fn no_match_message() -> String {
    format!(
        "{} Não há jogos agendados no momento. Usa /actualizar_data para tentar obter novos dados.",
        PULHAS
    )
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Segunda-feira",
        Weekday::Tue => "Terça-feira",
        Weekday::Wed => "Quarta-feira",
        Weekday::Thu => "Quinta-feira",
        Weekday::Fri => "Sexta-feira",
        Weekday::Sat => "Sábado",
        Weekday::Sun => "Domingo",
    }
}

// A kickoff already behind `now` counts down from zero.
pub fn format_countdown(record: Option<&MatchRecord>, now: &DateTime<Tz>) -> String {
    let Some(record) = record else {
        return no_match_message();
    };

    let kickoff = record.kickoff.with_timezone(&now.timezone());
    let total = (kickoff - *now).num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if kickoff.date_naive() == now.date_naive() {
        format!(
            "{} É hoje! Já só falta(m) {} hora(s), {} minuto(s) e {} segundo(s) para ver o Glorioso de novo! {}",
            PULHAS, hours, minutes, seconds, SLB
        )
    } else {
        format!(
            "{} Falta(m) {} dia(s), {} hora(s), {} minuto(s) e {} segundo(s) para ver o Glorioso de novo! {}",
            PULHAS, days, hours, minutes, seconds, SLB
        )
    }
}

pub fn format_schedule(record: Option<&MatchRecord>) -> String {
    let Some(record) = record else {
        return no_match_message();
    };

    let mut sentence = format!(
        "{} {}, dia {} às <t:{}:t>, {} vs {}, no {} para o/a {}",
        PULHAS,
        weekday_name(record.kickoff.weekday()),
        record.kickoff.day(),
        record.kickoff.timestamp(),
        SLB,
        record.adversary,
        record.location,
        record.competition
    );
    if let Some(channel) = record.tv_channel.as_deref().filter(|c| !c.is_empty()) {
        sentence.push_str(&format!(" 📺 {}", channel));
    }
    sentence
}

pub fn format_upcoming(fixtures: &[UpcomingFixture], tz: Tz) -> String {
    if fixtures.is_empty() {
        return "❌ Não há jogos futuros disponíveis no calendário.".to_string();
    }

    let mut message = String::from("📅 **Próximos Jogos do Benfica**\n");
    for (index, fixture) in fixtures.iter().enumerate() {
        let marker = NUMBER_MARKERS
            .get(index)
            .map(|m| m.to_string())
            .unwrap_or_else(|| format!("**{}.**", index + 1));
        // Unreadable dates are shown as sent rather than dropping the entry.
        let when = match fixture.kickoff(tz) {
            Ok(kickoff) => format!("<t:{}:F>", kickoff.timestamp()),
            Err(_) => format!("{} {}", fixture.date, fixture.time),
        };
        let home_away = if fixture.home.is_home() { "🏠" } else { "✈️" };

        message.push_str(&format!(
            "\n{} ⚽ **{}**\n🗓️ {}\n{} {} | 🏟️ {}\n🏆 {}",
            marker,
            fixture.adversary,
            when,
            home_away,
            fixture.home.label(),
            fixture.location,
            fixture.competition
        ));
        if let Some(channel) = fixture.tv_channel.as_deref().filter(|c| !c.is_empty()) {
            message.push_str(&format!(" | 📺 {}", channel));
        }
        message.push('\n');
    }
    message
}
