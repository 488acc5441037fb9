//! Structural response validation, specialized per step kind.

/// Status the server answers auth transitions (login/logout) with on success.
const AUTH_REDIRECT_STATUS: u16 = 302;

/// How a step's response is judged protocol-valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// A full page render: 200 with a body longer than `min_len`, guarding
    /// against empty or error pages disguised as 200s.
    FullPage { min_len: usize },
    /// A partial/AJAX update: 200 with a well-formed partial-response
    /// envelope that carries neither an embedded error nor an embedded
    /// redirect instruction. A redirect inside the envelope means the
    /// session expired and the server is bouncing us to the login page.
    Partial,
    /// An auth transition: the redirect itself is the success signal. A 200
    /// usually means the form re-rendered with invalid credentials.
    AuthRedirect,
}

impl Validation {
    pub fn accepts(&self, status: u16, body: &str) -> bool {
        match self {
            Validation::FullPage { min_len } => status == 200 && body.len() > *min_len,
            Validation::Partial => {
                status == 200
                    && is_partial_envelope(body)
                    && !body.contains("<error")
                    && !body.contains("<redirect")
            }
            Validation::AuthRedirect => status == AUTH_REDIRECT_STATUS,
        }
    }
}

/// True when the body is a partial-response envelope, allowing for an XML
/// prolog and leading whitespace.
pub fn is_partial_envelope(body: &str) -> bool {
    let rest = body.trim_start();
    let rest = if let Some(after) = rest.strip_prefix("<?xml") {
        match after.find("?>") {
            Some(end) => after[end + 2..].trim_start(),
            None => return false,
        }
    } else {
        rest
    };
    rest.starts_with("<partial-response")
}
