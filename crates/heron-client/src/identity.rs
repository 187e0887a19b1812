// Human-readable client identity sent in the Start message.
//
// None of this is verified, so the broker should treat it as display-only.
use std::env;

const SEP: &str = ";";

/// Builds the client-id string from the program name plus whatever host,
/// user and pid details are available: `program: <prog>;host: <host>;user:
/// <uid/gid/username(fullname)>;pid: <pid>`. Missing details render as
/// empty fields; the separators always remain.
pub fn client_id(prog_name: &str) -> String {
    let mut id = String::from("program: ");
    id.push_str(prog_name);
    id.push_str(SEP);
    id.push_str("host: ");
    id.push_str(&hostname());
    id.push_str(SEP);
    id.push_str("user: ");
    id.push_str(&user_details());
    id.push_str(SEP);
    id.push_str("pid: ");
    id.push_str(&std::process::id().to_string());
    id
}

#[cfg(unix)]
fn hostname() -> String {
    // The empty string stands in for a failed lookup, keeping the field
    // separators in place.
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return String::new();
    }

    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

#[cfg(not(unix))]
fn hostname() -> String {
    env::var("COMPUTERNAME").unwrap_or_default()
}

#[cfg(unix)]
fn user_details() -> String {
    let uid = unsafe { libc::getuid() };
    let gid = unsafe { libc::getgid() };
    let username = env::var("USER")
        .or_else(|_| env::var("LOGNAME"))
        .unwrap_or_default();
    // The full name would come from the user database; it is not available
    // here so the parentheses stay empty.
    format!("{uid}/{gid}/{username}()")
}

#[cfg(not(unix))]
fn user_details() -> String {
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_has_the_fixed_shape() {
        let id = client_id("test-prog");
        assert!(id.starts_with("program: test-prog;"), "got {id:?}");

        let parts: Vec<&str> = id.split(SEP).collect();
        assert_eq!(parts.len(), 4, "got {id:?}");
        assert!(parts[1].starts_with("host: "));
        assert!(parts[2].starts_with("user: "));
        assert!(parts[3].starts_with("pid: "));

        let pid: u32 = parts[3]["pid: ".len()..].parse().expect("numeric pid");
        assert_eq!(pid, std::process::id());
    }

    #[cfg(unix)]
    #[test]
    fn hostname_comes_from_the_os() {
        assert!(!hostname().is_empty(), "gethostname lookup failed");
    }
}
