//! Maintainer annotator behavior

mod common;

use common::TestRepo;
use pkgcycle::core::annotate::Annotator;
use pkgcycle::core::recipe;

#[test]
fn test_annotates_known_packages_from_repo() {
    let repo = TestRepo::new();
    repo.add_package("python-requests", &[]);
    repo.add_package("ruff", &[]);

    let (recipes, errors) = recipe::load_recipes(&repo.repo_dir());
    assert!(errors.is_empty());
    let annotator = Annotator::new(&recipes);

    assert_eq!(
        annotator.annotate_line("python-requests: out of date"),
        "python-requests: out of date  (@tester)"
    );
    assert_eq!(
        annotator.annotate_line("ruff 0.4.1 is ready"),
        "ruff 0.4.1 is ready  (@tester)"
    );
}

#[test]
fn test_unknown_lines_pass_through() {
    let repo = TestRepo::new();
    repo.add_package("python-requests", &[]);

    let (recipes, _) = recipe::load_recipes(&repo.repo_dir());
    let annotator = Annotator::new(&recipes);

    let lines = [
        "unrelated chatter",
        "",
        "   ",
        "python-requestsx is a different token",
    ];
    for line in lines {
        assert_eq!(annotator.annotate_line(line), line);
    }
}
