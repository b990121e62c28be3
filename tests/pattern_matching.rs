// Matching engine behaviour through the public API: canonical patterns,
// binding round trips and specificity ranking.
use apiproxy::{
    PathMatcher, Template,
    core::httppattern::{ParseError, select_most_specific},
    wildcard_pattern_for,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn fields(matcher: &PathMatcher) -> Vec<&str> {
    matcher.bound_field_paths().iter().map(|f| f.as_ref()).collect()
}

#[test]
fn canonical_patterns() {
    let cases: &[(&str, &str, &[&str])] = &[
        (
            "/shelves/{shelf_id}/books/{book.id}",
            "^/shelves/[^/]+/books/[^/]+$",
            &["shelf_id", "book.id"],
        ),
        (
            "/shelves/{shelf_id}/books/{book.id}:checkout",
            "^/shelves/[^/]+/books/[^/]+:checkout$",
            &["shelf_id", "book.id"],
        ),
        ("/test/*/test/**", "^/test/[^/]+/test/.*$", &[]),
        ("/test/*/test/**:upload", "^/test/[^/]+/test/.*:upload$", &[]),
        ("/test/{x=*}/test/{y=**}", "^/test/[^/]+/test/.*$", &["x", "y"]),
        ("/test/{name=*}/test/**", "^/test/[^/]+/test/.*$", &["name"]),
        ("/v1/{name=books/*}", "^/v1/books/[^/]+$", &["name"]),
        (
            "/v1/{test=a/b/*}/route/{resource_id=shelves/*/books/**}:upload",
            "^/v1/a/b/[^/]+/route/shelves/[^/]+/books/.*:upload$",
            &["test", "resource_id"],
        ),
        ("/v1/{name=/books/*}", "^/v1//books/[^/]+$", &["name"]),
    ];

    for (template, pattern, expected_fields) in cases {
        let matcher = PathMatcher::parse(template).unwrap();
        assert_eq!(matcher.pattern(), *pattern, "pattern for {template}");
        assert_eq!(fields(&matcher), *expected_fields, "fields for {template}");
        assert_eq!(wildcard_pattern_for(template), *pattern);
    }
}

#[test]
fn doubled_slash_is_kept() {
    let matcher = PathMatcher::parse("/v1/{name=/books/*}").unwrap();
    assert!(matcher.pattern().contains("//"));
    let bindings = matcher.matches("/v1//books/moby").unwrap();
    assert_eq!(bindings.get("name"), Some("/books/moby"));
    assert!(matcher.matches("/v1/books/moby").is_none());
}

#[test]
fn literal_templates_and_rejections() {
    let shelves = PathMatcher::parse("/shelves").unwrap();
    assert!(shelves.is_exact_literal());
    assert_eq!(shelves.pattern(), "");
    assert!(shelves.bound_field_paths().is_empty());
    assert!(shelves.matches("/shelves").unwrap().is_empty());
    assert!(shelves.matches("/shelves/").is_none());
    assert_eq!(wildcard_pattern_for("/shelves"), "");

    assert!(matches!(
        Template::parse("**"),
        Err(ParseError::MissingLeadingSlash { .. })
    ));
    assert_eq!(wildcard_pattern_for("**"), "");
}

#[test]
fn single_wildcard_never_spans_segments() {
    let matcher = PathMatcher::parse("/shelves/{shelf}").unwrap();
    assert!(matcher.matches("/shelves/a/b").is_none());
    assert!(matcher.matches("/shelves/").is_none());
}

#[test]
fn most_specific_template_wins() {
    let catchall = PathMatcher::parse("/v1/{x=**}").unwrap();
    let shelf = PathMatcher::parse("/v1/shelves/{id}").unwrap();

    let candidates = [("catchall", &catchall), ("shelf", &shelf)]
        .into_iter()
        .filter_map(|(name, m)| m.matches("/v1/shelves/5").map(|_| (m.specificity(), name)));
    assert_eq!(select_most_specific(candidates), Some("shelf"));

    // declaration order does not change the outcome
    let reversed = [("shelf", &shelf), ("catchall", &catchall)]
        .into_iter()
        .filter_map(|(name, m)| m.matches("/v1/shelves/5").map(|_| (m.specificity(), name)));
    assert_eq!(select_most_specific(reversed), Some("shelf"));
}

#[test]
fn ties_go_to_first_declared() {
    let a = PathMatcher::parse("/v1/{a}/x").unwrap();
    let b = PathMatcher::parse("/v1/{b}/x").unwrap();
    let picked = select_most_specific(vec![(a.specificity(), "a"), (b.specificity(), "b")]);
    assert_eq!(picked, Some("a"));
}

/// Shape of a template, used to build matching paths with known bindings.
enum Piece {
    Lit(&'static str),
    Star,
    StarStar,
    Var(&'static str, Vec<Piece>),
}

const SEGMENT_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-._~:";

fn random_segment(rng: &mut StdRng, allow_slash: bool, allow_empty: bool) -> String {
    let min = if allow_empty { 0 } else { 1 };
    let len = rng.random_range(min..=12);
    (0..len)
        .map(|_| {
            if allow_slash && rng.random_bool(0.2) {
                '/'
            } else {
                SEGMENT_CHARS[rng.random_range(0..SEGMENT_CHARS.len())] as char
            }
        })
        .collect()
}

fn render(
    pieces: &[Piece],
    rng: &mut StdRng,
    path: &mut String,
    bindings: &mut Vec<(String, String)>,
) {
    for piece in pieces {
        match piece {
            Piece::Lit(text) => path.push_str(text),
            Piece::Star => path.push_str(&random_segment(rng, false, false)),
            Piece::StarStar => path.push_str(&random_segment(rng, true, true)),
            Piece::Var(field, inner) => {
                let mut value = String::new();
                render(inner, rng, &mut value, bindings);
                path.push_str(&value);
                bindings.push((field.to_string(), value));
            }
        }
    }
}

#[test]
fn round_trip_recovers_substituted_values() {
    use Piece::*;

    let shapes: Vec<(&str, Vec<Piece>)> = vec![
        (
            "/shelves/{shelf_id}/books/{book.id}",
            vec![
                Lit("/shelves/"),
                Var("shelf_id", vec![Star]),
                Lit("/books/"),
                Var("book.id", vec![Star]),
            ],
        ),
        (
            "/shelves/{shelf_id}/books/{book.id}:checkout",
            vec![
                Lit("/shelves/"),
                Var("shelf_id", vec![Star]),
                Lit("/books/"),
                Var("book.id", vec![Star]),
                Lit(":checkout"),
            ],
        ),
        (
            "/test/*/test/**:upload",
            vec![Lit("/test/"), Star, Lit("/test/"), StarStar, Lit(":upload")],
        ),
        (
            "/test/{x=*}/test/{y=**}",
            vec![
                Lit("/test/"),
                Var("x", vec![Star]),
                Lit("/test/"),
                Var("y", vec![StarStar]),
            ],
        ),
        (
            "/v1/{name=books/*}",
            vec![Lit("/v1/"), Var("name", vec![Lit("books/"), Star])],
        ),
        (
            "/v1/{test=a/b/*}/route/{resource_id=shelves/*/books/**}:upload",
            vec![
                Lit("/v1/"),
                Var("test", vec![Lit("a/b/"), Star]),
                Lit("/route/"),
                Var(
                    "resource_id",
                    vec![Lit("shelves/"), Star, Lit("/books/"), StarStar],
                ),
                Lit(":upload"),
            ],
        ),
        (
            "/v1/{name=/books/*}",
            vec![Lit("/v1/"), Var("name", vec![Lit("/books/"), Star])],
        ),
    ];

    let mut rng = StdRng::seed_from_u64(0x5eed_cafe);
    for (template, pieces) in &shapes {
        let matcher = PathMatcher::parse(template).unwrap();
        for _ in 0..200 {
            let mut path = String::new();
            let mut expected = Vec::new();
            render(pieces, &mut rng, &mut path, &mut expected);

            let bindings = matcher
                .matches(&path)
                .unwrap_or_else(|| panic!("{template} should match {path}"));
            let actual: Vec<(String, String)> = bindings
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            assert_eq!(actual, expected, "bindings of {path} against {template}");
        }
    }
}

const WORDS: &[&str] = &["v1", "shelves", "books", "items", "a-b", "x.y"];
const FIELDS: &[&str] = &["a", "b.c", "d", "e_f", "g"];
const VERBS: &[&str] = &[":get", ":upload", ":batch-create"];

/// Random template with at most one `**`, always in the last segment.
fn random_template(rng: &mut StdRng) -> (String, Vec<Piece>) {
    use Piece::*;

    let mut template = String::new();
    let mut pieces = Vec::new();
    let mut fields = FIELDS.iter().copied();
    let segments = rng.random_range(1..=4);

    for i in 0..segments {
        template.push('/');
        pieces.push(Lit("/"));
        let last = i + 1 == segments;
        let kinds = if last { 6 } else { 4 };
        let choice = rng.random_range(0..kinds);
        let word = WORDS[rng.random_range(0..WORDS.len())];
        match choice {
            0 => {
                template.push_str(word);
                pieces.push(Lit(word));
            }
            1 => {
                template.push('*');
                pieces.push(Star);
            }
            2 => match fields.next() {
                Some(field) => {
                    template.push_str(&format!("{{{field}}}"));
                    pieces.push(Var(field, vec![Star]));
                }
                None => {
                    template.push('*');
                    pieces.push(Star);
                }
            },
            3 => match fields.next() {
                Some(field) => {
                    template.push_str(&format!("{{{field}={word}/*}}"));
                    pieces.push(Var(field, vec![Lit(word), Lit("/"), Star]));
                }
                None => {
                    template.push_str(word);
                    pieces.push(Lit(word));
                }
            },
            4 => {
                template.push_str("**");
                pieces.push(StarStar);
            }
            _ => match fields.next() {
                Some(field) => {
                    template.push_str(&format!("{{{field}=**}}"));
                    pieces.push(Var(field, vec![StarStar]));
                }
                None => {
                    template.push_str("**");
                    pieces.push(StarStar);
                }
            },
        }
    }

    if rng.random_bool(0.3) {
        let verb = VERBS[rng.random_range(0..VERBS.len())];
        template.push_str(verb);
        pieces.push(Lit(verb));
    }
    (template, pieces)
}

#[test]
fn round_trip_over_generated_templates() {
    let mut rng = StdRng::seed_from_u64(0x7e3a_1a7e);
    for _ in 0..300 {
        let (template, pieces) = random_template(&mut rng);
        let matcher = PathMatcher::parse(&template)
            .unwrap_or_else(|e| panic!("{template} should parse: {e}"));

        for _ in 0..20 {
            let mut path = String::new();
            let mut expected = Vec::new();
            render(&pieces, &mut rng, &mut path, &mut expected);

            let bindings = matcher
                .matches(&path)
                .unwrap_or_else(|| panic!("{template} should match {path}"));
            let actual: Vec<(String, String)> = bindings
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            assert_eq!(actual, expected, "bindings of {path} against {template}");
        }
    }
}
