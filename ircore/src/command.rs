//! Bidirectional map between command mnemonics and `CommandId`, §4.A.
//!
//! Pinned to RFC 2812's named commands plus the numeric replies 000-999 (spec.md
//! §9c). The table is a plain static array checked with a linear scan at lookup
//! time; recognized-command lookups are not a hot path relative to socket I/O, so
//! there is no case for a `phf`-style compile-time perfect hash here.
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum CommandId {
    Pass,
    Nick,
    User,
    Server,
    Oper,
    Quit,
    Squit,
    Join,
    Part,
    Mode,
    Topic,
    Names,
    List,
    Invite,
    Kick,
    Privmsg,
    Notice,
    Motd,
    Lusers,
    Version,
    Stats,
    Links,
    Time,
    Connect,
    Trace,
    Admin,
    Info,
    Servlist,
    Squery,
    Who,
    Whois,
    Whowas,
    Kill,
    Ping,
    Pong,
    Error,
    Away,
    Rehash,
    Die,
    Restart,
    Summon,
    Users,
    Wallops,
    Userhost,
    Ison,
    Cap,
    Authenticate,
    /// A three-digit numeric reply, 000-999.
    Numeric(u16),
}

const TEXTUAL_TABLE: &[(&str, CommandId)] = &[
    ("PASS", CommandId::Pass),
    ("NICK", CommandId::Nick),
    ("USER", CommandId::User),
    ("SERVER", CommandId::Server),
    ("OPER", CommandId::Oper),
    ("QUIT", CommandId::Quit),
    ("SQUIT", CommandId::Squit),
    ("JOIN", CommandId::Join),
    ("PART", CommandId::Part),
    ("MODE", CommandId::Mode),
    ("TOPIC", CommandId::Topic),
    ("NAMES", CommandId::Names),
    ("LIST", CommandId::List),
    ("INVITE", CommandId::Invite),
    ("KICK", CommandId::Kick),
    ("PRIVMSG", CommandId::Privmsg),
    ("NOTICE", CommandId::Notice),
    ("MOTD", CommandId::Motd),
    ("LUSERS", CommandId::Lusers),
    ("VERSION", CommandId::Version),
    ("STATS", CommandId::Stats),
    ("LINKS", CommandId::Links),
    ("TIME", CommandId::Time),
    ("CONNECT", CommandId::Connect),
    ("TRACE", CommandId::Trace),
    ("ADMIN", CommandId::Admin),
    ("INFO", CommandId::Info),
    ("SERVLIST", CommandId::Servlist),
    ("SQUERY", CommandId::Squery),
    ("WHO", CommandId::Who),
    ("WHOIS", CommandId::Whois),
    ("WHOWAS", CommandId::Whowas),
    ("KILL", CommandId::Kill),
    ("PING", CommandId::Ping),
    ("PONG", CommandId::Pong),
    ("ERROR", CommandId::Error),
    ("AWAY", CommandId::Away),
    ("REHASH", CommandId::Rehash),
    ("DIE", CommandId::Die),
    ("RESTART", CommandId::Restart),
    ("SUMMON", CommandId::Summon),
    ("USERS", CommandId::Users),
    ("WALLOPS", CommandId::Wallops),
    ("USERHOST", CommandId::Userhost),
    ("ISON", CommandId::Ison),
    ("CAP", CommandId::Cap),
    ("AUTHENTICATE", CommandId::Authenticate),
];

/// Looks up a command token (case-insensitive for textual mnemonics, exact for
/// three-digit numerics). Returns `None` for anything not recognized; this is not
/// an error, per spec.md §4.A — an unrecognized token is a normal outcome.
pub fn lookup_by_mnemonic(text: &str) -> Option<CommandId> {
    if is_numeric_token(text) {
        return text.parse::<u16>().ok().map(CommandId::Numeric);
    }
    TEXTUAL_TABLE
        .iter()
        .find(|(mnemonic, _)| mnemonic.eq_ignore_ascii_case(text))
        .map(|(_, id)| *id)
}

/// The canonical wire mnemonic for a recognized id. Textual commands return a
/// process-lifetime constant; numerics are reconstructed on demand since there is
/// no useful fixed table of 1000 static strings to hold them in.
pub fn mnemonic_of(id: CommandId) -> Cow<'static, str> {
    if let CommandId::Numeric(n) = id {
        return Cow::Owned(format!("{:03}", n));
    }
    TEXTUAL_TABLE
        .iter()
        .find(|(_, candidate)| *candidate == id)
        .map(|(mnemonic, _)| Cow::Borrowed(*mnemonic))
        .expect("every non-numeric CommandId has a TEXTUAL_TABLE entry")
}

fn is_numeric_token(text: &str) -> bool {
    text.len() == 3 && text.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textual_lookup_is_case_insensitive() {
        assert_eq!(lookup_by_mnemonic("privmsg"), Some(CommandId::Privmsg));
        assert_eq!(lookup_by_mnemonic("PrivMsg"), Some(CommandId::Privmsg));
        assert_eq!(lookup_by_mnemonic("PRIVMSG"), Some(CommandId::Privmsg));
    }

    #[test]
    fn numeric_lookup_requires_exact_three_digits() {
        assert_eq!(lookup_by_mnemonic("001"), Some(CommandId::Numeric(1)));
        assert_eq!(lookup_by_mnemonic("999"), Some(CommandId::Numeric(999)));
        assert_eq!(lookup_by_mnemonic("01"), None);
        assert_eq!(lookup_by_mnemonic("1000"), None);
        assert_eq!(lookup_by_mnemonic("0a1"), None);
    }

    #[test]
    fn unknown_token_is_none_not_error() {
        assert_eq!(lookup_by_mnemonic("FROBNICATE"), None);
    }

    #[test]
    fn mnemonic_of_round_trips() {
        assert_eq!(mnemonic_of(CommandId::Join), "JOIN");
        assert_eq!(mnemonic_of(CommandId::Numeric(1)), "001");
        assert_eq!(mnemonic_of(CommandId::Numeric(353)), "353");
    }
}
