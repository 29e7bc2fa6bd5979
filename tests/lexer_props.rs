use arrowvm_rust::processor::lexer::{KEYWORDS, Lexer, TokenKind};
use proptest::prelude::*;

fn lex(src: &str) -> Vec<(String, TokenKind)> {
    Lexer::new(src)
        .map(|t| t.expect("valid token"))
        .map(|t| (t.text.to_string(), t.kind))
        .collect()
}

fn token() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z][a-z0-9]{0,6}",
        "[0-9]{1,4}",
        "[0-9]{1,3}\\.[0-9]{1,3}",
        prop::sample::select(vec![";", "(", ")", "+", "-", "*", "/", "<", ">", ",", "=", ".", "->"])
            .prop_map(str::to_string),
    ]
}

proptest! {
    #[test]
    fn relexing_joined_lexemes_gives_same_kinds(tokens in prop::collection::vec(token(), 0..24)) {
        let first = lex(&tokens.join(" "));
        let lexemes: Vec<_> = first.iter().map(|(text, _)| text.as_str()).collect();
        let second = lex(&lexemes.join(" "));

        let kinds = |v: &[(String, TokenKind)]| v.iter().map(|(_, k)| *k).collect::<Vec<_>>();
        prop_assert_eq!(kinds(&first), kinds(&second));
        prop_assert_eq!(first.len(), tokens.len() + 1);
    }

    #[test]
    fn alphabetic_runs_are_identifiers_unless_keywords(word in "[a-zA-Z]{1,8}") {
        let tokens = lex(&word);
        let expected = if KEYWORDS.contains(&word.as_str()) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        };
        prop_assert_eq!(tokens[0].1, expected);
        prop_assert_eq!(tokens[1].1, TokenKind::EndOfInput);
    }
}

#[test]
fn test_every_keyword() {
    for keyword in KEYWORDS {
        let src = format!("{keyword} x");
        let kinds: Vec<_> = lex(&src).into_iter().map(|(_, k)| k).collect();
        assert_eq!(
            kinds,
            vec![TokenKind::Keyword, TokenKind::Identifier, TokenKind::EndOfInput]
        );
    }
}

#[test]
fn test_malformed_real_terminates() {
    let results: Vec<_> = Lexer::new("3.").collect();
    assert_eq!(results.len(), 2);
    let err = results[0].as_ref().unwrap_err();
    assert_eq!(err.to_string(), "expected a digit, got end of input");
    assert!(matches!(&results[1], Ok(t) if t.kind == TokenKind::EndOfInput));
}
