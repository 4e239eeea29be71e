use insight_core::models::{AnalysisResponse, User};
use insight_core::{GuardVerdict, Session};

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format an optional string, returning a default if None
pub fn format_optional(value: &Option<String>, default: &str) -> String {
    value.as_deref().unwrap_or(default).to_string()
}

pub fn verdict_label(verdict: GuardVerdict) -> &'static str {
    match verdict {
        GuardVerdict::Loading => "loading",
        GuardVerdict::RedirectToLogin => "login required",
        GuardVerdict::Denied => "access denied",
        GuardVerdict::Allowed => "allowed",
    }
}

pub fn session_summary(session: &Session) -> String {
    match session.user() {
        Some(user) if session.is_authenticated() => {
            let roles = if user.roles.is_empty() {
                "none".to_string()
            } else {
                user.roles.join(", ")
            };
            format!(
                "Logged in as {} (roles: {}, admin: {})",
                user.username,
                roles,
                if session.is_admin() { "yes" } else { "no" }
            )
        }
        _ => "Not logged in".to_string(),
    }
}

pub fn analysis(resp: &AnalysisResponse) -> String {
    let mut out = String::new();
    if let Some(topic) = &resp.topic {
        out.push_str(&format!("Topic: {}\n\n", topic));
    }
    out.push_str(&format!("Summary\n  {}\n", resp.summary));

    if !resp.key_concepts.is_empty() {
        out.push_str("\nKey concepts\n");
        for concept in &resp.key_concepts {
            out.push_str(&format!("  - {}\n", concept));
        }
    }

    if !resp.recommendations.is_empty() {
        out.push_str("\nRecommended reading\n");
        for rec in &resp.recommendations {
            out.push_str(&format!("  * {}\n", rec.title));
            if let Some(description) = &rec.description {
                out.push_str(&format!("      {}\n", description));
            }
            if let Some(url) = &rec.url {
                out.push_str(&format!("      {}\n", url));
            }
        }
    }

    if let Some(ts) = resp.timestamp {
        out.push_str(&format!("\nGenerated {}\n", ts.format("%b %d, %Y %H:%M UTC")));
    }
    out
}

const ID_WIDTH: usize = 6;
const USERNAME_WIDTH: usize = 20;
const EMAIL_WIDTH: usize = 30;
const NAME_WIDTH: usize = 24;

pub fn user_table(users: &[User]) -> String {
    let mut out = format!(
        "{:<id$} {:<un$} {:<em$} {:<nm$}\n",
        "ID",
        "USERNAME",
        "EMAIL",
        "NAME",
        id = ID_WIDTH,
        un = USERNAME_WIDTH,
        em = EMAIL_WIDTH,
        nm = NAME_WIDTH,
    );
    for user in users {
        let id = user.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<id$} {:<un$} {:<em$} {:<nm$}\n",
            id,
            truncate_string(&user.username, USERNAME_WIDTH),
            truncate_string(&user.email, EMAIL_WIDTH),
            truncate_string(&user.display_name(), NAME_WIDTH),
            id = ID_WIDTH,
            un = USERNAME_WIDTH,
            em = EMAIL_WIDTH,
            nm = NAME_WIDTH,
        ));
    }
    out.push_str(&format!("\n{} user(s)", users.len()));
    out
}

pub fn user_detail(user: &User) -> String {
    format!(
        "ID:       {}\nUsername: {}\nEmail:    {}\nName:     {}\nCreated:  {}\nUpdated:  {}",
        user.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
        user.username,
        user.email,
        user.display_name(),
        format_optional(&user.created_at, "-"),
        format_optional(&user.updated_at, "-"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_core::UserProfile;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
        assert_eq!(truncate_string("Привет мир", 7), "Прив...");
    }

    #[test]
    fn test_session_summary() {
        assert_eq!(session_summary(&Session::logged_out()), "Not logged in");

        let session = Session::authenticated(
            "t".to_string(),
            UserProfile::new("alice", vec!["ROLE_ADMIN".to_string()]),
        );
        assert_eq!(
            session_summary(&session),
            "Logged in as alice (roles: ROLE_ADMIN, admin: yes)"
        );
    }

    #[test]
    fn test_user_table_counts_rows() {
        let users = vec![User {
            id: Some(1),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            ..Default::default()
        }];
        let table = user_table(&users);
        assert!(table.contains("alice@example.com"));
        assert!(table.ends_with("1 user(s)"));
    }
}
