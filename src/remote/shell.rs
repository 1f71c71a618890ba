//! Shell text helpers shared by the session and the command builders.

/// Marker sudo prints before asking for a password.
const SUDO_PROMPT_MARKER: &str = "[sudo] password for ";

/// Line break inserted for display output.
const DISPLAY_BREAK: &str = "<br />";

/// Quotes `arg` as a single POSIX shell word.
#[must_use]
pub fn quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Returns `arg` unchanged when it contains only shell-safe characters,
/// otherwise quotes it.
#[must_use]
pub fn word(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));
    if safe { arg.to_string() } else { quote(arg) }
}

/// Wraps `command` so it runs through sudo.
///
/// With `password_on_stdin` sudo reads the password from standard input and
/// prints no prompt; otherwise sudo must not prompt at all.
#[must_use]
pub fn elevate(command: &str, password_on_stdin: bool) -> String {
    let flags = if password_on_stdin { "-S -p ''" } else { "-n" };
    format!("sudo {} sh -c {}", flags, quote(command))
}

/// Converts output to display form: every line break gets an HTML break
/// in front of it.
#[must_use]
pub fn to_display(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                out.push_str(DISPLAY_BREAK);
                out.push_str("\r\n");
            }
            '\r' | '\n' => {
                out.push_str(DISPLAY_BREAK);
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    out
}

/// Reverses [`to_display`].
#[must_use]
pub fn from_display(text: &str) -> String {
    text.replace(DISPLAY_BREAK, "")
}

/// Removes sudo password prompts from command output.
#[must_use]
pub fn strip_sudo_prompt(output: &str) -> String {
    if !output.contains(SUDO_PROMPT_MARKER) {
        return output.to_string();
    }

    let mut cleaned = String::with_capacity(output.len());
    for line in output.split_inclusive('\n') {
        match line.find(SUDO_PROMPT_MARKER) {
            Some(start) => {
                let rest = &line[start..];
                // Prompt ends at the first ':'; keep what follows on the line.
                let after = rest.find(':').map_or("", |end| &rest[end + 1..]);
                cleaned.push_str(&line[..start]);
                cleaned.push_str(after.trim_start_matches(' '));
            }
            None => cleaned.push_str(line),
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes_single_quotes() {
        assert_eq!(quote("abc"), "'abc'");
        assert_eq!(quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_word_leaves_safe_text() {
        assert_eq!(word("8080:80"), "8080:80");
        assert_eq!(word("/data:/var/lib/data"), "/data:/var/lib/data");
        assert_eq!(word("KEY=VALUE"), "KEY=VALUE");
        assert_eq!(word("KEY=two words"), "'KEY=two words'");
        assert_eq!(word(""), "''");
    }

    #[test]
    fn test_elevate() {
        assert_eq!(
            elevate("docker ps -a", false),
            "sudo -n sh -c 'docker ps -a'"
        );
        assert_eq!(
            elevate("docker ps -a", true),
            "sudo -S -p '' sh -c 'docker ps -a'"
        );
    }

    #[test]
    fn test_to_display() {
        assert_eq!(to_display("a\nb"), "a<br />\nb");
        assert_eq!(to_display("a\r\nb"), "a<br />\r\nb");
        assert_eq!(to_display("plain"), "plain");
        assert_eq!(from_display(&to_display("a\r\nb\nc")), "a\r\nb\nc");
    }

    #[test]
    fn test_strip_sudo_prompt() {
        let output = "[sudo] password for deploy: CONTAINER ID\nabc\n";
        assert_eq!(strip_sudo_prompt(output), "CONTAINER ID\nabc\n");
        assert_eq!(strip_sudo_prompt("no prompt\n"), "no prompt\n");
    }
}
