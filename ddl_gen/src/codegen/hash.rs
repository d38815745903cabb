use std::collections::BTreeMap;

/// String hashes the text dispatcher can switch on. The generated C++
/// reproduces the same function so that case labels match at run time.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HashFunction {
    Djb2a,
    Sdbm,
}

impl HashFunction {
    /// Candidates in order of preference.
    pub const ALL: [HashFunction; 2] = [HashFunction::Djb2a, HashFunction::Sdbm];

    pub fn name(self) -> &'static str {
        match self {
            HashFunction::Djb2a => "djb2a",
            HashFunction::Sdbm => "sdbm",
        }
    }

    pub fn hash(self, text: &str) -> u32 {
        match self {
            HashFunction::Djb2a => text
                .bytes()
                .fold(5381u32, |h, c| h.wrapping_mul(33) ^ u32::from(c)),
            HashFunction::Sdbm => text.bytes().fold(0u32, |h, c| {
                u32::from(c)
                    .wrapping_add(h << 6)
                    .wrapping_add(h << 16)
                    .wrapping_sub(h)
            }),
        }
    }

    /// Definition of `str_hash` in the generated dispatcher.
    pub fn cpp_definition(self) -> &'static str {
        match self {
            HashFunction::Djb2a => {
                "uint32_t str_hash(const std::string& str)\n\
                 {\n\
                 \x20 uint32_t hash = 5381;\n\
                 \x20 for (std::string::const_iterator it = str.begin(); it != str.end(); ++ it) {\n\
                 \x20   hash = (hash * 33) ^ uint32_t((unsigned char)*it);\n\
                 \x20 }\n\
                 \x20 return hash;\n\
                 }\n"
            }
            HashFunction::Sdbm => {
                "uint32_t str_hash(const std::string& str)\n\
                 {\n\
                 \x20 uint32_t hash = 0;\n\
                 \x20 for (std::string::const_iterator it = str.begin(); it != str.end(); ++ it) {\n\
                 \x20   hash = uint32_t((unsigned char)*it) + (hash << 6) + (hash << 16) - hash;\n\
                 \x20 }\n\
                 \x20 return hash;\n\
                 }\n"
            }
        }
    }

    /// Groups names by hash value; buckets keep the input order.
    pub fn buckets<'a, I>(self, names: I) -> BTreeMap<u32, Vec<&'a str>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut buckets: BTreeMap<u32, Vec<&'a str>> = BTreeMap::new();
        for name in names {
            buckets.entry(self.hash(name)).or_default().push(name);
        }
        buckets
    }

    /// Number of names that share a hash with an earlier name.
    pub fn collisions<'a, I>(self, names: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.buckets(names).values().map(|b| b.len() - 1).sum()
    }
}

/// Picks the first function with no collisions, otherwise the one with the
/// fewest (ties go to the earlier function). Returns the collision count too.
pub fn select(names: &[&str]) -> (HashFunction, usize) {
    let mut best = (HashFunction::ALL[0], usize::MAX);
    for function in HashFunction::ALL {
        let collisions = function.collisions(names.iter().copied());
        if collisions == 0 {
            return (function, 0);
        }
        if collisions < best.1 {
            best = (function, collisions);
        }
    }
    best
}
