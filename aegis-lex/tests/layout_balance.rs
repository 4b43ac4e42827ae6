use aegis_lex::{Lexer, TokenKind};
use proptest::{
    prelude::prop,
    test_runner::{Config, TestCaseError, TestRunner},
};

/// Builds an indentation-valid program from a list of requested depths: each
/// line may go at most one level deeper than the previous one.
fn program_from_depths(depths: &[u8], width: usize) -> String {
    let mut src = String::new();
    let mut prev = 0usize;
    for (i, d) in depths.iter().enumerate() {
        let depth = (*d as usize).min(prev + 1);
        src.push_str(&" ".repeat(depth * width));
        src.push_str(&format!("x{i} = {i}"));
        if i % 3 == 0 {
            src.push_str("  # trailing");
        }
        src.push('\n');
        if i % 4 == 1 {
            src.push('\n');
        }
        prev = depth;
    }
    src
}

#[test]
fn block_markers_balance_for_any_valid_layout() {
    let mut runner = TestRunner::new(Config {
        cases: 128,
        ..Config::default()
    });

    let strat = (
        prop::collection::vec(0u8..6, 0..40),
        prop::sample::select(vec![1usize, 2, 4, 8]),
    );

    runner
        .run(&strat, |(depths, width)| {
            let src = program_from_depths(&depths, width);
            let out = Lexer::new(&src).lex();
            if !out.errors.is_empty() {
                return Err(TestCaseError::fail(format!("{src:?}: {:?}", out.errors)));
            }

            let mut open = 0i64;
            for tok in &out.tokens {
                match tok.kind {
                    TokenKind::Indent => open += 1,
                    TokenKind::Dedent => open -= 1,
                    _ => {}
                }
                if open < 0 {
                    return Err(TestCaseError::fail(format!("dedent underflow in {src:?}")));
                }
            }
            if open != 0 {
                return Err(TestCaseError::fail(format!("{open} unclosed blocks in {src:?}")));
            }
            match out.tokens.last().map(|t| &t.kind) {
                Some(TokenKind::Eof) => Ok(()),
                other => Err(TestCaseError::fail(format!("last token {other:?}"))),
            }
        })
        .map_err(|e| e.to_string())
        .unwrap();
}
