//! Walkers that rewrite the class names embedded in descriptors and generic
//! signatures. The mapping function receives internal names only.

use crate::error::{Error, Result};

/// Maps an internal name or, for `[`-prefixed names, an array descriptor.
pub fn map_type(name: &str, map: &dyn Fn(&str) -> String) -> Result<String> {
    if name.starts_with('[') {
        map_field_desc(name, map)
    } else {
        Ok(map(name))
    }
}

pub fn map_field_desc(desc: &str, map: &dyn Fn(&str) -> String) -> Result<String> {
    let mut out = String::with_capacity(desc.len());
    let end = walk_field_type(desc, 0, map, &mut out)?;
    if end != desc.len() {
        return Err(malformed("field descriptor", desc));
    }
    Ok(out)
}

pub fn map_method_desc(desc: &str, map: &dyn Fn(&str) -> String) -> Result<String> {
    let bytes = desc.as_bytes();
    if bytes.first() != Some(&b'(') {
        return Err(malformed("method descriptor", desc));
    }

    let mut out = String::with_capacity(desc.len());
    out.push('(');
    let mut pos = 1;
    loop {
        match bytes.get(pos) {
            Some(b')') => break,
            Some(_) => pos = walk_field_type(desc, pos, map, &mut out)?,
            None => return Err(malformed("method descriptor", desc)),
        }
    }
    out.push(')');
    pos += 1;

    if bytes.get(pos) == Some(&b'V') {
        out.push('V');
        pos += 1;
    } else {
        pos = walk_field_type(desc, pos, map, &mut out)?;
    }

    if pos != desc.len() {
        return Err(malformed("method descriptor", desc));
    }
    Ok(out)
}

fn walk_field_type(
    desc: &str,
    mut pos: usize,
    map: &dyn Fn(&str) -> String,
    out: &mut String,
) -> Result<usize> {
    let bytes = desc.as_bytes();
    loop {
        match bytes.get(pos) {
            Some(b'[') => {
                out.push('[');
                pos += 1;
            }
            Some(c @ (b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z')) => {
                out.push(char::from(*c));
                return Ok(pos + 1);
            }
            Some(b'L') => {
                let end = desc[pos..]
                    .find(';')
                    .map(|i| pos + i)
                    .ok_or_else(|| malformed("descriptor", desc))?;
                let name = &desc[pos + 1..end];
                if name.is_empty() {
                    return Err(malformed("descriptor", desc));
                }
                out.push('L');
                out.push_str(&map(name));
                out.push(';');
                return Ok(end + 1);
            }
            _ => return Err(malformed("descriptor", desc)),
        }
    }
}

/// Rewrites a class, method or field generic signature.
pub fn map_signature(signature: &str, map: &dyn Fn(&str) -> String) -> Result<String> {
    let mut walker = SignatureWalker {
        sig: signature,
        pos: 0,
        out: String::with_capacity(signature.len()),
        map,
    };
    walker.signature()?;
    Ok(walker.out)
}

struct SignatureWalker<'a> {
    sig: &'a str,
    pos: usize,
    out: String,
    map: &'a dyn Fn(&str) -> String,
}

impl SignatureWalker<'_> {
    fn peek(&self) -> Option<u8> {
        self.sig.as_bytes().get(self.pos).copied()
    }

    fn error(&self) -> Error {
        Error::unsupported(format!(
            "cannot parse signature {:?} at offset {}",
            self.sig, self.pos
        ))
    }

    fn copy(&mut self) -> Result<()> {
        let c = self.peek().ok_or_else(|| self.error())?;
        self.out.push(char::from(c));
        self.pos += 1;
        Ok(())
    }

    fn expect(&mut self, wanted: u8) -> Result<()> {
        if self.peek() != Some(wanted) {
            return Err(self.error());
        }
        self.copy()
    }

    /// Reads up to (not including) the first of `stops`.
    fn identifier(&mut self, stops: &[u8]) -> Result<&str> {
        let rest = &self.sig[self.pos..];
        let len = rest
            .bytes()
            .position(|b| stops.contains(&b))
            .ok_or_else(|| self.error())?;
        if len == 0 {
            return Err(self.error());
        }
        self.pos += len;
        Ok(&self.sig[self.pos - len..self.pos])
    }

    fn signature(&mut self) -> Result<()> {
        if self.peek() == Some(b'<') {
            self.formal_type_parameters()?;
        }

        if self.peek() == Some(b'(') {
            self.copy()?;
            while self.peek() != Some(b')') {
                self.type_signature()?;
            }
            self.copy()?;
            if self.peek() == Some(b'V') {
                self.copy()?;
            } else {
                self.type_signature()?;
            }
            while self.peek() == Some(b'^') {
                self.copy()?;
                self.reference_type()?;
            }
        } else {
            // Class signatures are a superclass followed by interfaces; a
            // field signature is a single reference type.
            self.reference_type()?;
            while self.pos < self.sig.len() {
                self.reference_type()?;
            }
        }

        if self.pos != self.sig.len() {
            return Err(self.error());
        }
        Ok(())
    }

    fn formal_type_parameters(&mut self) -> Result<()> {
        self.expect(b'<')?;
        while self.peek() != Some(b'>') {
            let name = self.identifier(b":")?.to_string();
            self.out.push_str(&name);
            while self.peek() == Some(b':') {
                self.copy()?;
                if matches!(self.peek(), Some(b'L' | b'T' | b'[')) {
                    self.reference_type()?;
                }
            }
        }
        self.expect(b'>')
    }

    fn type_signature(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => self.copy(),
            _ => self.reference_type(),
        }
    }

    fn reference_type(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'L') => self.class_type(),
            Some(b'T') => {
                self.copy()?;
                let name = self.identifier(b";")?.to_string();
                self.out.push_str(&name);
                self.expect(b';')
            }
            Some(b'[') => {
                self.copy()?;
                self.type_signature()
            }
            _ => Err(self.error()),
        }
    }

    fn class_type(&mut self) -> Result<()> {
        self.expect(b'L')?;
        let mut full_name = self.identifier(b"<.;")?.to_string();
        let mapped = (self.map)(&full_name);
        self.out.push_str(&mapped);
        if self.peek() == Some(b'<') {
            self.type_arguments()?;
        }

        while self.peek() == Some(b'.') {
            self.copy()?;
            let inner = self.identifier(b"<.;")?.to_string();
            let mapped_outer = format!("{}$", (self.map)(&full_name));
            full_name = format!("{full_name}${inner}");
            let mapped = (self.map)(&full_name);
            let segment = match mapped.strip_prefix(&mapped_outer) {
                Some(segment) => segment,
                None => mapped.rsplit('$').next().unwrap_or(&mapped),
            };
            self.out.push_str(segment);
            if self.peek() == Some(b'<') {
                self.type_arguments()?;
            }
        }

        self.expect(b';')
    }

    fn type_arguments(&mut self) -> Result<()> {
        self.expect(b'<')?;
        while self.peek() != Some(b'>') {
            match self.peek() {
                Some(b'*') => self.copy()?,
                Some(b'+' | b'-') => {
                    self.copy()?;
                    self.reference_type()?;
                }
                _ => self.reference_type()?,
            }
        }
        self.expect(b'>')
    }
}

fn malformed(kind: &str, value: &str) -> Error {
    Error::unsupported(format!("malformed {kind}: {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rename(name: &str) -> String {
        match name {
            "a" => "com/example/Foo".to_string(),
            "a$b" => "com/example/Foo$Bar".to_string(),
            "c" => "com/example/Baz".to_string(),
            other => other.to_string(),
        }
    }

    #[test]
    fn maps_method_descriptor() {
        let mapped = map_method_desc("(La;I[Lc;)La;", &rename).unwrap();
        assert_eq!(mapped, "(Lcom/example/Foo;I[Lcom/example/Baz;)Lcom/example/Foo;");
    }

    #[test]
    fn maps_array_type_names() {
        assert_eq!(map_type("[[La;", &rename).unwrap(), "[[Lcom/example/Foo;");
        assert_eq!(map_type("c", &rename).unwrap(), "com/example/Baz");
    }

    #[test]
    fn rejects_malformed_descriptors() {
        assert!(map_field_desc("La", &rename).is_err());
        assert!(map_method_desc("(I", &rename).is_err());
        assert!(map_field_desc("Q", &rename).is_err());
    }

    #[test]
    fn maps_generic_method_signature() {
        let sig = "<T:La;L:Ljava/lang/Object;>(TT;Ljava/util/List<+Lc;>;)TL;^La;";
        let mapped = map_signature(sig, &rename).unwrap();
        assert_eq!(
            mapped,
            "<T:Lcom/example/Foo;L:Ljava/lang/Object;>(TT;Ljava/util/List<+Lcom/example/Baz;>;)TL;^Lcom/example/Foo;"
        );
    }

    #[test]
    fn maps_inner_class_signature_segments() {
        let mapped = map_signature("La<TT;>.b;", &rename).unwrap();
        assert_eq!(mapped, "Lcom/example/Foo<TT;>.Bar;");
    }

    #[test]
    fn maps_class_signature_with_interface_bound() {
        let sig = "<K::Ljava/lang/Comparable<TK;>;>La;Ljava/util/Map<TK;*>;";
        let mapped = map_signature(sig, &rename).unwrap();
        assert_eq!(
            mapped,
            "<K::Ljava/lang/Comparable<TK;>;>Lcom/example/Foo;Ljava/util/Map<TK;*>;"
        );
    }
}
