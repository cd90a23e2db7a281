use crate::TemplateError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Literal(String),
    Placeholder { path: Vec<PathStep>, raw: String },
}

/// One step of a `{{ a.b[2].c }}` lookup path.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PathStep {
    Key(String),
    Index(usize),
}

pub(crate) fn parse(source: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = source;

    loop {
        match (rest.find("{{"), rest.find("}}")) {
            (None, None) => {
                if !rest.is_empty() {
                    segments.push(Segment::Literal(rest.to_string()));
                }
                return Ok(segments);
            }
            (None, Some(_)) => {
                return Err(TemplateError::Syntax {
                    detail: "'}}' without a matching '{{'".to_string(),
                });
            }
            (Some(open), close) => {
                if close.is_some_and(|close| close < open) {
                    return Err(TemplateError::Syntax {
                        detail: "'}}' without a matching '{{'".to_string(),
                    });
                }

                let Some(close) = close else {
                    return Err(TemplateError::Syntax {
                        detail: "'{{' without a matching '}}'".to_string(),
                    });
                };

                if open > 0 {
                    segments.push(Segment::Literal(rest[..open].to_string()));
                }

                let raw = rest[open + 2..close].trim().to_string();
                let path = parse_path(&raw)?;
                segments.push(Segment::Placeholder { path, raw });

                rest = &rest[close + 2..];
            }
        }
    }
}

fn parse_path(raw: &str) -> Result<Vec<PathStep>, TemplateError> {
    if raw.is_empty() {
        return Err(TemplateError::Syntax {
            detail: "empty placeholder".to_string(),
        });
    }

    let mut steps = Vec::new();

    for part in raw.split('.') {
        let (ident, indexes) = split_indexes(part)?;

        if ident.is_empty() && steps.is_empty() {
            return Err(TemplateError::Syntax {
                detail: format!("placeholder '{raw}' must start with an identifier"),
            });
        }

        if !ident.is_empty() {
            if !is_identifier(ident) {
                return Err(TemplateError::Syntax {
                    detail: format!("invalid identifier '{ident}' in placeholder '{raw}'"),
                });
            }

            steps.push(PathStep::Key(ident.to_string()));
        }

        steps.extend(indexes.into_iter().map(PathStep::Index));
    }

    Ok(steps)
}

/// Split `answer[2][0]` into the identifier and its trailing indexes.
fn split_indexes(part: &str) -> Result<(&str, Vec<usize>), TemplateError> {
    let Some(bracket) = part.find('[') else {
        return Ok((part, Vec::new()));
    };

    let (ident, mut rest) = part.split_at(bracket);
    let mut indexes = Vec::new();

    while !rest.is_empty() {
        let inner = rest
            .strip_prefix('[')
            .and_then(|r| r.split_once(']'))
            .ok_or_else(|| TemplateError::Syntax {
                detail: format!("malformed index in '{part}'"),
            })?;

        let index = inner.0.trim().parse::<usize>().map_err(|_| TemplateError::Syntax {
            detail: format!("non-numeric index '{}' in '{part}'", inner.0),
        })?;

        indexes.push(index);
        rest = inner.1;
    }

    Ok((ident, indexes))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();

    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
