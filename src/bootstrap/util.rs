//! Path helpers for workstation-side files.

/// Expands a leading `~/` prefix to the user's home directory.
///
/// When `HOME` is not set the input is returned unchanged.
///
/// # Examples
///
/// ```
/// # use knife_euca::bootstrap::expand_tilde;
/// let home = std::env::var("HOME").expect("HOME should be set");
/// assert_eq!(expand_tilde("~/.ssh/id_rsa"), format!("{home}/.ssh/id_rsa"));
/// assert_eq!(expand_tilde("/etc/chef/validation.pem"), "/etc/chef/validation.pem");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}
