/// Strips a leading `www.` label, so `www.example.com` and `example.com` compare equal
pub fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}
