use roster_tools::matcher::{MatchConfig, Matcher, Query};
use roster_tools::model::{Identifier, MatchResult, MatchTier, Period, Person, Roster, Submission};
use roster_tools::normalize::{normalize, normalize_email};

fn person(name: &str, period: u32) -> Person {
    Person::new(name, Period::Number(period), "Earth Science")
}

fn roster(people: Vec<Person>) -> Roster {
    Roster::new(people).expect("valid roster")
}

fn submitted(identifier: &str, period: u32) -> Submission {
    Submission::new(Identifier::parse(identifier), 2).with_period(Period::Number(period))
}

fn matched_name<'a>(result: &MatchResult<'a>) -> Option<(&'a str, MatchTier, bool)> {
    match result {
        MatchResult::Matched {
            person,
            tier,
            cross_period,
        } => Some((Person::full_name(*person), *tier, *cross_period)),
        _ => None,
    }
}

#[test]
fn normalization_is_deterministic_and_reorders_commas() {
    let reordered = normalize("Garcia Rodriguez, Maria");
    assert_eq!(reordered, normalize("maria garcia rodriguez"));
    assert_eq!(reordered, normalize("  MARIA   Garcia   Rodriguez "));
    assert_eq!(normalize("Garcia Rodriguez, Maria"), reordered);
    assert_eq!(normalize(&reordered.to_string()), reordered);

    let email = normalize_email("maria.garcia@school.org");
    assert_eq!(email, normalize("Maria Garcia"));
}

#[test]
fn compound_surnames_match_at_exact_tiers() {
    let roster = roster(vec![person("Maria Garcia Rodriguez", 1), person("Ana Lopez", 1)]);
    let matcher = Matcher::default();

    let by_comma = matcher.match_submission(&submitted("Garcia Rodriguez, Maria", 1), &roster);
    assert_eq!(
        matched_name(&by_comma),
        Some(("Maria Garcia Rodriguez", MatchTier::Exact, false))
    );

    let first_surname_only = matcher.match_submission(&submitted("Maria Garcia", 1), &roster);
    assert_eq!(
        matched_name(&first_surname_only),
        Some(("Maria Garcia Rodriguez", MatchTier::NormalizedExact, false))
    );

    let by_email = matcher.match_submission(
        &submitted("maria.garciarodriguez2031@school.org", 1),
        &roster,
    );
    assert_eq!(
        matched_name(&by_email),
        Some(("Maria Garcia Rodriguez", MatchTier::NormalizedExact, false))
    );
}

#[test]
fn exact_match_wins_over_looser_candidates() {
    let roster = roster(vec![person("Maria Garcia", 1), person("Maria Garcia Lopez", 1)]);
    let result = Matcher::default().match_submission(&submitted("maria garcia", 1), &roster);
    assert_eq!(
        matched_name(&result),
        Some(("Maria Garcia", MatchTier::Exact, false))
    );
}

#[test]
fn ties_are_reported_as_ambiguous() {
    let roster = roster(vec![
        person("Maria Garcia Rodriguez", 1),
        person("Maria Garcia Lopez", 1),
        person("Jon Smith", 1),
        person("Jan Smith", 1),
    ]);
    let matcher = Matcher::default();

    match matcher.match_submission(&submitted("Maria Garcia", 1), &roster) {
        MatchResult::Ambiguous { candidates, tier } => {
            assert_eq!(tier, MatchTier::NormalizedExact);
            let mut names: Vec<&str> = candidates.iter().map(|p| p.full_name()).collect();
            names.sort();
            assert_eq!(names, ["Maria Garcia Lopez", "Maria Garcia Rodriguez"]);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }

    match matcher.match_submission(&submitted("Jen Smith", 1), &roster) {
        MatchResult::Ambiguous { candidates, tier } => {
            assert_eq!(tier, MatchTier::Fuzzy);
            assert_eq!(candidates.len(), 2);
        }
        other => panic!("expected fuzzy tie, got {other:?}"),
    }
}

#[test]
fn fuzzy_matches_must_clear_the_threshold() {
    let roster = roster(vec![person("Carlos Mendoza", 2)]);

    let lenient = Matcher::default().match_submission(&submitted("Carlos Mendosa", 2), &roster);
    assert_eq!(
        matched_name(&lenient),
        Some(("Carlos Mendoza", MatchTier::Fuzzy, false))
    );

    let strict = Matcher::new(MatchConfig {
        fuzzy_threshold: 0.95,
        ..MatchConfig::default()
    });
    assert_eq!(
        strict.match_submission(&submitted("Carlos Mendosa", 2), &roster),
        MatchResult::Unmatched
    );
}

#[test]
fn other_periods_are_searched_only_as_a_fallback() {
    let roster = roster(vec![person("Ana Lopez", 1), person("Ben Ortiz", 2)]);

    let result = Matcher::default().match_submission(&submitted("Ben Ortiz", 1), &roster);
    assert_eq!(
        matched_name(&result),
        Some(("Ben Ortiz", MatchTier::Exact, true))
    );

    let confined = Matcher::new(MatchConfig {
        cross_period_fallback: false,
        ..MatchConfig::default()
    });
    assert_eq!(
        confined.match_submission(&submitted("Ben Ortiz", 1), &roster),
        MatchResult::Unmatched
    );
}

#[test]
fn blank_queries_never_match() {
    let people = vec![person("Ana Lopez", 1)];
    let matcher = Matcher::default();
    assert_eq!(
        matcher.find(&Query::from_key(normalize(" . ")), &people, None),
        MatchResult::Unmatched
    );
    assert_eq!(
        matcher.find(&Query::from_key(normalize("Zed Quinn")), &people, None),
        MatchResult::Unmatched
    );
}

#[test]
fn a_given_name_inside_another_does_not_claim_the_username() {
    let roster = roster(vec![person("Ana Lopez", 1), person("Diana Lopez", 2)]);

    let result =
        Matcher::default().match_submission(&submitted("diana.lopez42@school.org", 1), &roster);
    assert_eq!(
        matched_name(&result),
        Some(("Diana Lopez", MatchTier::Exact, true))
    );
}

#[test]
fn identical_keys_in_one_period_are_ambiguous() {
    let people = vec![person("Ana Lopez", 1), person("Lopez, Ana", 1)];
    let result = Matcher::default().find(
        &Query::from_key(normalize("ana lopez")),
        &people,
        Some(&Period::Number(1)),
    );
    match result {
        MatchResult::Ambiguous { candidates, tier } => {
            assert_eq!(tier, MatchTier::Exact);
            assert_eq!(candidates.len(), 2);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
}
