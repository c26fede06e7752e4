//! Static quote catalog served by the API.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub text: &'static str,
    pub author: &'static str,
}

pub const QUOTES: &[Quote] = &[
    Quote {
        text: "The only way to do great work is to love what you do.",
        author: "Steve Jobs",
    },
    Quote {
        text: "Code is like humor. When you have to explain it, it's bad.",
        author: "Cory House",
    },
    Quote {
        text: "First, solve the problem. Then, write the code.",
        author: "John Johnson",
    },
    Quote {
        text: "Any fool can write code that a computer can understand. Good programmers write code that humans can understand.",
        author: "Martin Fowler",
    },
    Quote {
        text: "Experience is the name everyone gives to their mistakes.",
        author: "Oscar Wilde",
    },
    Quote {
        text: "In order to be irreplaceable, one must always be different.",
        author: "Coco Chanel",
    },
    Quote {
        text: "Java is to JavaScript what car is to Carpet.",
        author: "Chris Heilmann",
    },
    Quote {
        text: "Knowledge is power.",
        author: "Francis Bacon",
    },
    Quote {
        text: "Sometimes it pays to stay in bed on Monday, rather than spending the rest of the week debugging Monday's code.",
        author: "Dan Salomon",
    },
    Quote {
        text: "Perfection is achieved not when there is nothing more to add, but rather when there is nothing more to take away.",
        author: "Antoine de Saint-Exupery",
    },
    Quote {
        text: "Ruby is rubbish! PHP is phpantastic!",
        author: "Nikita Popov",
    },
    Quote {
        text: "Code never lies, comments sometimes do.",
        author: "Ron Jeffries",
    },
    Quote {
        text: "Simplicity is the soul of efficiency.",
        author: "Austin Freeman",
    },
    Quote {
        text: "Before software can be reusable it first has to be usable.",
        author: "Ralph Johnson",
    },
    Quote {
        text: "Make it work, make it right, make it fast.",
        author: "Kent Beck",
    },
    Quote {
        text: "Optimism is an occupational hazard of programming: feedback is the treatment.",
        author: "Kent Beck",
    },
    Quote {
        text: "Walking on water and developing software from a specification are easy if both are frozen.",
        author: "Edward V. Berard",
    },
    Quote {
        text: "The best error message is the one that never shows up.",
        author: "Thomas Fuchs",
    },
    Quote {
        text: "Testing leads to failure, and failure leads to understanding.",
        author: "Burt Rutan",
    },
    Quote {
        text: "Talk is cheap. Show me the code.",
        author: "Linus Torvalds",
    },
    Quote {
        text: "Programs must be written for people to read, and only incidentally for machines to execute.",
        author: "Harold Abelson",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_non_empty_and_complete() {
        assert!(!QUOTES.is_empty());
        for quote in QUOTES {
            assert!(!quote.text.is_empty());
            assert!(!quote.author.is_empty());
        }
    }

    #[test]
    fn quotes_serialize_with_text_and_author() {
        let json = serde_json::to_value(&QUOTES[0]).unwrap();
        assert!(json["text"].is_string());
        assert!(json["author"].is_string());
    }
}
