/// Compares a request path with a fixed route. Letter case is ignored and one
/// trailing slash is tolerated.
pub fn route_matches(route: &str, path: &str) -> bool {
    let path = match path.len() > 1 {
        true => path.strip_suffix('/').unwrap_or(path),
        false => path,
    };
    route.eq_ignore_ascii_case(path)
}
