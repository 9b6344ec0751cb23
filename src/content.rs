//! 페이로드 형식 판별
//!
//! 첫 청크로 텍스트/바이너리를 구분하고, 바이너리는 매직 바이트 표로 확장자를 추정한다.
//! 표는 위에서부터 순서대로 매칭한다.

/// 어떤 시그니처에도 맞지 않을 때의 확장자
pub const DEFAULT_EXTENSION: &str = ".bin";

/// 매칭 규칙
#[derive(Debug, Clone, Copy)]
pub enum Rule {
    /// 처음부터 일치
    Prefix(&'static [u8]),

    /// 지정 오프셋에서 일치
    At(usize, &'static [u8]),

    /// 끝에서 N바이트 앞 위치에서 일치
    FromEnd(usize, &'static [u8]),

    /// 모든 규칙 일치
    All(&'static [Rule]),

    /// 하나라도 일치
    Any(&'static [Rule]),
}

impl Rule {
    pub fn matches(&self, data: &[u8]) -> bool {
        match *self {
            Rule::Prefix(pattern) => data.starts_with(pattern),
            Rule::At(offset, pattern) => data
                .get(offset..offset + pattern.len())
                .map_or(false, |window| window == pattern),
            Rule::FromEnd(back, pattern) => data
                .len()
                .checked_sub(back)
                .and_then(|start| data.get(start..start + pattern.len()))
                .map_or(false, |window| window == pattern),
            Rule::All(rules) => rules.iter().all(|rule| rule.matches(data)),
            Rule::Any(rules) => rules.iter().any(|rule| rule.matches(data)),
        }
    }
}

/// 매직 바이트 시그니처
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub rule: Rule,
    pub extension: &'static str,
}

/// 확장자 추정 표 (순서 중요)
pub const SIGNATURES: &[Signature] = &[
    Signature { rule: Rule::Prefix(&[0xFF, 0xD8, 0xFF]), extension: ".jpg" },
    Signature { rule: Rule::Prefix(&[0x89, b'P', b'N', b'G']), extension: ".png" },
    Signature { rule: Rule::Prefix(b"GIF8"), extension: ".gif" },
    Signature { rule: Rule::Prefix(b"BM"), extension: ".bmp" },
    Signature { rule: Rule::At(4, b"ftyp"), extension: ".mp4" },
    Signature {
        rule: Rule::All(&[Rule::Prefix(b"RIFF"), Rule::At(8, b"WAVE")]),
        extension: ".wav",
    },
    Signature {
        // ID3v2 헤더 또는 ID3v1 트레일러 (끝에서 128바이트)
        rule: Rule::Any(&[Rule::Prefix(b"ID3"), Rule::FromEnd(128, b"TAG")]),
        extension: ".mp3",
    },
];

/// 수신 페이로드 분류
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Text,
    Binary { extension: String },
}

impl Classification {
    pub fn binary(extension: impl Into<String>) -> Self {
        Classification::Binary {
            extension: extension.into(),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Classification::Text)
    }

    /// 텍스트는 None
    pub fn extension(&self) -> Option<&str> {
        match self {
            Classification::Text => None,
            Classification::Binary { extension } => Some(extension),
        }
    }
}

/// 매직 바이트로 확장자 추정
pub fn sniff_extension(data: &[u8]) -> &'static str {
    SIGNATURES
        .iter()
        .find(|signature| signature.rule.matches(data))
        .map_or(DEFAULT_EXTENSION, |signature| signature.extension)
}

/// 첫 청크로 텍스트/바이너리 구분
///
/// 청크 경계에서 잘린 멀티바이트 문자는 텍스트로 본다.
pub fn classify_first_chunk(chunk: &[u8]) -> Classification {
    match std::str::from_utf8(chunk) {
        Ok(_) => Classification::Text,
        Err(e) if e.error_len().is_none() => Classification::Text,
        Err(_) => Classification::binary(sniff_extension(chunk)),
    }
}

/// 시그니처 표에 있는 확장자인지 (대소문자 무시)
pub fn is_known_extension(extension: &str) -> bool {
    SIGNATURES
        .iter()
        .any(|signature| signature.extension.eq_ignore_ascii_case(extension))
}
