//! Object tokens: the compact literal representation used for RPC command
//! arguments and structured results (spec §4.5/§6). A token is one of a
//! small closed set of shapes — integer, string, byte blob, or list of
//! tokens — tagged by a single byte so either side can decode without a
//! schema.

use crate::wire::{read_blob, read_i64, read_u8, write_blob, write_i64, write_u8};
use tokio::io::{self, AsyncRead, AsyncWrite};

const TAG_INT: u8 = 0;
const TAG_STR: u8 = 1;
const TAG_BYTES: u8 = 2;
const TAG_LIST: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Token>),
}

impl Token {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Token::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Token::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Token::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Token]> {
        match self {
            Token::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }

    pub fn write<'a, W: AsyncWrite + Unpin>(
        &'a self,
        w: &'a mut W,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = io::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            match self {
                Token::Int(v) => {
                    write_u8(w, TAG_INT).await?;
                    write_i64(w, *v).await
                }
                Token::Str(s) => {
                    write_u8(w, TAG_STR).await?;
                    write_blob(w, s.as_bytes()).await
                }
                Token::Bytes(b) => {
                    write_u8(w, TAG_BYTES).await?;
                    write_blob(w, b).await
                }
                Token::List(items) => {
                    write_u8(w, TAG_LIST).await?;
                    write_i64(w, items.len() as i64).await?;
                    for item in items {
                        item.write(w).await?;
                    }
                    Ok(())
                }
            }
        })
    }

    pub fn read<'a, R: AsyncRead + Unpin + Send>(
        r: &'a mut R,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = io::Result<Token>> + Send + 'a>> {
        Box::pin(async move {
            match read_u8(r).await? {
                TAG_INT => Ok(Token::Int(read_i64(r).await?)),
                TAG_STR => {
                    let bytes = read_blob(r).await?;
                    String::from_utf8(bytes)
                        .map(Token::Str)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
                }
                TAG_BYTES => Ok(Token::Bytes(read_blob(r).await?)),
                TAG_LIST => {
                    let len = read_i64(r).await?;
                    if len < 0 || len > 1_000_000 {
                        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad list length"));
                    }
                    let mut items = Vec::with_capacity(len as usize);
                    for _ in 0..len {
                        items.push(Token::read(r).await?);
                    }
                    Ok(Token::List(items))
                }
                tag => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown token tag {tag}"),
                )),
            }
        })
    }
}

impl From<i64> for Token {
    fn from(v: i64) -> Self {
        Token::Int(v)
    }
}

impl From<u64> for Token {
    fn from(v: u64) -> Self {
        Token::Int(v as i64)
    }
}

impl From<u32> for Token {
    fn from(v: u32) -> Self {
        Token::Int(v as i64)
    }
}

impl From<&str> for Token {
    fn from(v: &str) -> Self {
        Token::Str(v.to_string())
    }
}

impl From<String> for Token {
    fn from(v: String) -> Self {
        Token::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn roundtrip(tok: Token) {
        let mut buf = Vec::new();
        tok.write(&mut buf).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = Token::read(&mut cursor).await.unwrap();
        assert_eq!(tok, decoded);
    }

    #[tokio::test]
    async fn roundtrips_every_shape() {
        roundtrip(Token::Int(-42)).await;
        roundtrip(Token::Str("hello/world".into())).await;
        roundtrip(Token::Bytes(vec![1, 2, 3, 0, 255])).await;
        roundtrip(Token::List(vec![
            Token::Int(1),
            Token::Str("x".into()),
            Token::List(vec![Token::Int(2), Token::Int(3)]),
        ]))
        .await;
    }

    #[tokio::test]
    async fn empty_list_roundtrips() {
        roundtrip(Token::List(vec![])).await;
    }
}
