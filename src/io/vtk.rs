//! Legacy VTK unstructured-grid reader for tetrahedral meshes.
//!
//! # Classic layout
//!
//! ```text
//! # vtk DataFile Version 3.0
//! title
//! ASCII
//! DATASET UNSTRUCTURED_GRID
//! POINTS 4 double
//! 0 0 0  1 0 0  0 1 0  0 0 1
//! CELLS 1 5
//! 4 0 1 2 3
//! CELL_TYPES 1
//! 10
//! ```
//!
//! # 5.x layout
//!
//! ```text
//! CELLS 2 4
//! OFFSETS vtktypeint64
//! 0 4
//! CONNECTIVITY vtktypeint64
//! 0 1 2 3
//! ```
//!
//! `BINARY` files use the same keyword lines, each followed by a newline and
//! the values in big-endian byte order (`int` for classic `CELLS` and
//! `CELL_TYPES`). `FIELD` blocks and `METADATA` are skipped; point and cell
//! data sections end the read.

use std::path::Path;
use std::str::FromStr;

use nalgebra::Point3;

use crate::error::{InputError, InputResult};
use crate::io::{logged, read_bytes};

/// VTK cell type id for a linear tetrahedron.
pub const VTK_TETRA: u8 = 10;

/// Nodes and tetrahedral connectivity read from a VTK file.
pub type VtkTetrahedra = (Vec<Point3<f64>>, Vec<[usize; 4]>);

/// Load node positions and tetrahedral connectivity from a legacy VTK file.
///
/// # Errors
///
/// Returns [`InputError::FileNotFound`] if `path` does not exist and
/// [`InputError::InvalidContent`] if the file is not an unstructured grid
/// made only of tetrahedra.
pub fn load_vtk<P: AsRef<Path>>(path: P) -> InputResult<VtkTetrahedra> {
    let path = path.as_ref();
    let bytes = read_bytes(path)?;
    parse_vtk(&bytes).map_err(|message| logged(InputError::invalid_content(path, message)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Float,
    Signed,
    Unsigned,
}

/// Scalar type named on a `POINTS`, `OFFSETS` or field array line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ValueType {
    kind: Kind,
    size: usize,
}

impl ValueType {
    const INT: Self = Self {
        kind: Kind::Signed,
        size: 4,
    };

    fn parse(name: &str) -> Result<Self, String> {
        let (kind, size) = match name.to_ascii_lowercase().as_str() {
            "float" | "vtktypefloat32" => (Kind::Float, 4),
            "double" | "vtktypefloat64" => (Kind::Float, 8),
            "char" | "vtktypeint8" => (Kind::Signed, 1),
            "unsigned_char" | "vtktypeuint8" => (Kind::Unsigned, 1),
            "short" | "vtktypeint16" => (Kind::Signed, 2),
            "unsigned_short" | "vtktypeuint16" => (Kind::Unsigned, 2),
            "int" | "vtktypeint32" | "vtkidtype" => (Kind::Signed, 4),
            "unsigned_int" | "vtktypeuint32" => (Kind::Unsigned, 4),
            "long" | "vtktypeint64" => (Kind::Signed, 8),
            "unsigned_long" | "vtktypeuint64" => (Kind::Unsigned, 8),
            _ => return Err(format!("unsupported data type '{name}'")),
        };
        Ok(Self { kind, size })
    }

    /// Decode one big-endian value.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss
    )]
    fn read_be(self, chunk: &[u8]) -> f64 {
        let mut b = [0u8; 8];
        b[8 - self.size..].copy_from_slice(chunk);
        let bits = u64::from_be_bytes(b);
        let shift = 64 - 8 * self.size;

        match self.kind {
            Kind::Float if self.size == 4 => f64::from(f32::from_bits(bits as u32)),
            Kind::Float => f64::from_bits(bits),
            // Sign-extend from the top of the word
            Kind::Signed => (((bits << shift) as i64) >> shift) as f64,
            Kind::Unsigned => bits as f64,
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn to_index(value: f64, what: &str) -> Result<usize, String> {
    if value >= 0.0 && value.fract() == 0.0 && value < usize::MAX as f64 {
        Ok(value as usize)
    } else {
        Err(format!("invalid {what} {value}"))
    }
}

/// Cursor over the file body: whitespace-separated keywords, then either
/// text values or a raw big-endian block.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    binary: bool,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            binary: false,
        }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Rest of the current line, without the newline.
    fn line(&mut self) -> Option<&'a [u8]> {
        let bytes = self.bytes;
        let rest = &bytes[self.pos..];
        if rest.is_empty() {
            return None;
        }
        let end = rest.iter().position(|b| *b == b'\n').unwrap_or(rest.len());
        self.pos += (end + 1).min(rest.len());
        Some(&rest[..end])
    }

    /// Byte range of the next whitespace-separated token.
    fn next_token_range(&self) -> Option<(usize, usize)> {
        let rest = &self.bytes[self.pos..];
        let start = rest.iter().position(|b| !b.is_ascii_whitespace())?;
        let len = rest[start..]
            .iter()
            .position(u8::is_ascii_whitespace)
            .unwrap_or(rest.len() - start);
        Some((self.pos + start, self.pos + start + len))
    }

    fn at_end(&self) -> bool {
        self.next_token_range().is_none()
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.next_token_range().is_some_and(|(start, end)| {
            self.bytes[start..end].eq_ignore_ascii_case(keyword.as_bytes())
        })
    }

    fn token(&mut self, what: &str) -> Result<&'a str, String> {
        let (start, end) = self
            .next_token_range()
            .ok_or_else(|| format!("unexpected end of file while reading {what}"))?;
        self.pos = end;
        let bytes = self.bytes;
        std::str::from_utf8(&bytes[start..end])
            .map_err(|_| format!("invalid {what}: not text"))
    }

    fn number<T>(&mut self, what: &str) -> Result<T, String>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let token = self.token(what)?;
        token
            .parse()
            .map_err(|e| format!("invalid {what} '{token}': {e}"))
    }

    fn expect(&mut self, keyword: &str) -> Result<(), String> {
        let token = self.token(keyword)?;
        if token.eq_ignore_ascii_case(keyword) {
            Ok(())
        } else {
            Err(format!("expected {keyword}, found '{token}'"))
        }
    }

    /// Read `n` values of type `ty`. The declared count is never trusted for
    /// allocation beyond what the remaining input can hold.
    fn values(&mut self, n: usize, ty: ValueType, what: &str) -> Result<Vec<f64>, String> {
        if self.binary {
            // Binary data starts on the line after its keyword line
            self.line();
            let len = n
                .checked_mul(ty.size)
                .filter(|len| *len <= self.remaining())
                .ok_or_else(|| format!("truncated binary {what} data: {n} values declared"))?;
            let bytes = self.bytes;
            let block = &bytes[self.pos..self.pos + len];
            self.pos += len;
            Ok(block.chunks_exact(ty.size).map(|c| ty.read_be(c)).collect())
        } else {
            let mut out = Vec::with_capacity(n.min(self.remaining()));
            for _ in 0..n {
                out.push(self.number(what)?);
            }
            Ok(out)
        }
    }

    fn indices(&mut self, n: usize, ty: ValueType, what: &str) -> Result<Vec<usize>, String> {
        self.values(n, ty, what)?
            .into_iter()
            .map(|v| to_index(v, what))
            .collect()
    }

    /// Skip a `METADATA` block, which ends at the first blank line.
    fn skip_metadata(&mut self) {
        self.line();
        while let Some(line) = self.line() {
            if line.iter().all(u8::is_ascii_whitespace) {
                break;
            }
        }
    }
}

/// Parse the bytes of a legacy VTK file.
pub(crate) fn parse_vtk(bytes: &[u8]) -> Result<VtkTetrahedra, String> {
    let mut reader = Reader::new(bytes);

    // The three header lines are plain text even in binary files
    let version = String::from_utf8_lossy(reader.line().unwrap_or_default());
    if !version.trim_start().starts_with("# vtk DataFile") {
        return Err("missing '# vtk DataFile' header".to_owned());
    }
    reader.line().ok_or("missing title line")?;
    let format = String::from_utf8_lossy(reader.line().ok_or("missing format line")?);
    reader.binary = match format.trim().to_ascii_uppercase().as_str() {
        "ASCII" => false,
        "BINARY" => true,
        other => return Err(format!("unknown data format '{other}'")),
    };

    let mut dataset_seen = false;
    let mut points: Option<Vec<Point3<f64>>> = None;
    let mut cells: Option<Vec<Vec<usize>>> = None;
    let mut cell_types: Option<Vec<usize>> = None;

    while !reader.at_end() {
        let keyword = reader.token("section keyword")?.to_ascii_uppercase();
        match keyword.as_str() {
            "DATASET" => {
                let kind = reader.token("dataset type")?;
                if !kind.eq_ignore_ascii_case("UNSTRUCTURED_GRID") {
                    return Err(format!("unsupported dataset type '{kind}'"));
                }
                dataset_seen = true;
            }
            "FIELD" => skip_field(&mut reader)?,
            "POINTS" => {
                let n: usize = reader.number("point count")?;
                let ty = ValueType::parse(reader.token("point data type")?)?;
                let len = n
                    .checked_mul(3)
                    .ok_or_else(|| format!("point count {n} is too large"))?;
                let coords = reader.values(len, ty, "point coordinate")?;
                points = Some(
                    coords
                        .chunks_exact(3)
                        .map(|c| Point3::new(c[0], c[1], c[2]))
                        .collect(),
                );
            }
            "CELLS" => {
                let a: usize = reader.number("cell count")?;
                let b: usize = reader.number("cell list size")?;
                cells = Some(if reader.at_keyword("OFFSETS") {
                    read_offsets_cells(&mut reader, a, b)?
                } else {
                    let list = reader.indices(b, ValueType::INT, "cell list value")?;
                    split_classic_cells(&list, a)?
                });
            }
            "CELL_TYPES" => {
                let n: usize = reader.number("cell type count")?;
                cell_types = Some(reader.indices(n, ValueType::INT, "cell type")?);
            }
            "METADATA" => reader.skip_metadata(),
            "POINT_DATA" | "CELL_DATA" => break,
            other => return Err(format!("unexpected keyword '{other}'")),
        }
    }

    if !dataset_seen {
        return Err("missing DATASET UNSTRUCTURED_GRID".to_owned());
    }
    let points = points.ok_or("missing POINTS section")?;
    let cells = cells.ok_or("missing CELLS section")?;

    if let Some(types) = cell_types {
        if types.len() != cells.len() {
            return Err(format!(
                "CELL_TYPES lists {} cells but CELLS lists {}",
                types.len(),
                cells.len()
            ));
        }
        let tetra = usize::from(VTK_TETRA);
        if let Some((i, t)) = types.iter().enumerate().find(|(_, t)| **t != tetra) {
            return Err(format!(
                "cell {i} has VTK type {t}; only tetrahedra (type {VTK_TETRA}) are supported"
            ));
        }
    }

    let tets = cells
        .iter()
        .enumerate()
        .map(|(i, c)| {
            <[usize; 4]>::try_from(c.as_slice()).map_err(|_| {
                format!(
                    "cell {i} has {} nodes; only tetrahedra are supported",
                    c.len()
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((points, tets))
}

/// `FIELD name n` followed by `n` arrays of `name ncomp ntuples type` and their values.
fn skip_field(reader: &mut Reader<'_>) -> Result<(), String> {
    let _name = reader.token("field name")?;
    let n: usize = reader.number("field array count")?;
    for _ in 0..n {
        let name = reader.token("field array name")?;
        if name.eq_ignore_ascii_case("NULL_ARRAY") {
            continue;
        }
        let ncomp: usize = reader.number("field array components")?;
        let ntuples: usize = reader.number("field array tuples")?;
        let ty = ValueType::parse(reader.token("field array data type")?)?;
        let count = ncomp
            .checked_mul(ntuples)
            .ok_or_else(|| format!("field array '{name}' is too large"))?;
        reader.values(count, ty, "field value")?;
        if reader.at_keyword("METADATA") {
            reader.expect("METADATA")?;
            reader.skip_metadata();
        }
    }
    Ok(())
}

/// Split a classic `CELLS` list of `count i0 .. i{count-1}` records into `n` cells.
fn split_classic_cells(list: &[usize], n: usize) -> Result<Vec<Vec<usize>>, String> {
    let mut cells = Vec::with_capacity(n.min(list.len()));
    let mut rest = list;
    for i in 0..n {
        let (&count, tail) = rest
            .split_first()
            .ok_or_else(|| format!("CELLS list ends after {i} of {n} cells"))?;
        if tail.len() < count {
            return Err(format!("cell {i} declares {count} nodes past the end of CELLS"));
        }
        let (cell, tail) = tail.split_at(count);
        cells.push(cell.to_vec());
        rest = tail;
    }
    if !rest.is_empty() {
        return Err(format!(
            "CELLS declared a list size of {} but the records hold {} values",
            list.len(),
            list.len() - rest.len()
        ));
    }
    Ok(cells)
}

/// `CELLS n_offsets n_connectivity` followed by `OFFSETS` and `CONNECTIVITY` arrays.
fn read_offsets_cells(
    reader: &mut Reader<'_>,
    n_offsets: usize,
    n_connectivity: usize,
) -> Result<Vec<Vec<usize>>, String> {
    reader.expect("OFFSETS")?;
    let ty = ValueType::parse(reader.token("offset data type")?)?;
    let offsets = reader.indices(n_offsets, ty, "cell offset")?;
    reader.expect("CONNECTIVITY")?;
    let ty = ValueType::parse(reader.token("connectivity data type")?)?;
    let connectivity = reader.indices(n_connectivity, ty, "cell node index")?;

    offsets
        .windows(2)
        .map(|w| {
            let (start, end) = (w[0], w[1]);
            if start > end || end > connectivity.len() {
                return Err(format!("invalid cell offsets {start}..{end}"));
            }
            Ok(connectivity[start..end].to_vec())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSIC: &str = "# vtk DataFile Version 3.0
two tets
ASCII
DATASET UNSTRUCTURED_GRID
POINTS 5 double
0 0 0
1 0 0
0 1 0
0 0 1
1 1 1
CELLS 2 10
4 0 1 2 3
4 1 2 3 4
CELL_TYPES 2
10
10
CELL_DATA 2
SCALARS rho double
LOOKUP_TABLE default
1 2
";

    const MODERN: &str = "# vtk DataFile Version 5.1
two tets
ASCII
DATASET UNSTRUCTURED_GRID
POINTS 5 float
0 0 0 1 0 0 0 1 0
0 0 1 1 1 1
METADATA
INFORMATION 0

CELLS 3 8
OFFSETS vtktypeint64
0 4 8
CONNECTIVITY vtktypeint64
0 1 2 3
1 2 3 4
CELL_TYPES 2
10 10
";

    #[test]
    fn classic_and_offsets_layouts_agree() {
        let (p0, t0) = parse_vtk(CLASSIC.as_bytes()).unwrap();
        let (p1, t1) = parse_vtk(MODERN.as_bytes()).unwrap();
        assert_eq!(p0.len(), 5);
        assert_eq!(p0, p1);
        assert_eq!(t0, vec![[0, 1, 2, 3], [1, 2, 3, 4]]);
        assert_eq!(t0, t1);
        assert_eq!(p0[4], Point3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn non_tetrahedral_cells_are_rejected() {
        let text = CLASSIC.replace("CELL_TYPES 2\n10\n10", "CELL_TYPES 2\n10\n12");
        let err = parse_vtk(text.as_bytes()).unwrap_err();
        assert!(err.contains("only tetrahedra"));

        let text = CLASSIC.replace("CELLS 2 10\n4 0 1 2 3", "CELLS 2 9\n3 0 1 2");
        let text = text.replace("CELL_TYPES 2\n10\n10\n", "");
        let err = parse_vtk(text.as_bytes()).unwrap_err();
        assert!(err.contains("has 3 nodes"));
    }

    fn be_bytes<T, const N: usize>(values: &[T], to_be: fn(T) -> [u8; N]) -> Vec<u8>
    where
        T: Copy,
    {
        values.iter().flat_map(|v| to_be(*v)).collect()
    }

    #[test]
    fn binary_classic_layout_matches_ascii() {
        let coords = [
            0.0_f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0,
        ];
        let mut bytes =
            b"# vtk DataFile Version 3.0\ntwo tets\nBINARY\nDATASET UNSTRUCTURED_GRID\nPOINTS 5 float\n"
                .to_vec();
        bytes.extend(be_bytes(&coords, f32::to_be_bytes));
        bytes.extend_from_slice(b"\nCELLS 2 10\n");
        bytes.extend(be_bytes(&[4_i32, 0, 1, 2, 3, 4, 1, 2, 3, 4], i32::to_be_bytes));
        bytes.extend_from_slice(b"\nCELL_TYPES 2\n");
        bytes.extend(be_bytes(&[10_i32, 10], i32::to_be_bytes));
        bytes.extend_from_slice(b"\nCELL_DATA 2\n");

        assert_eq!(
            parse_vtk(&bytes).unwrap(),
            parse_vtk(CLASSIC.as_bytes()).unwrap()
        );
    }

    #[test]
    fn binary_offsets_layout_after_field_data() {
        let coords = [
            0.0_f64, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0,
        ];
        let mut bytes = b"# vtk DataFile Version 5.1\nvtk output\nBINARY\nDATASET UNSTRUCTURED_GRID\n\
FIELD FieldData 2\nTIME 1 1 double\n"
            .to_vec();
        bytes.extend(be_bytes(&[0.5_f64], f64::to_be_bytes));
        bytes.extend_from_slice(b"\nCYCLE 1 1 int\n");
        // 0x0a0a0a0a: newline bytes inside a binary block are data
        bytes.extend(be_bytes(&[0x0a0a_0a0a_i32], i32::to_be_bytes));
        bytes.extend_from_slice(b"\nMETADATA\nINFORMATION 0\n\nPOINTS 5 double\n");
        bytes.extend(be_bytes(&coords, f64::to_be_bytes));
        bytes.extend_from_slice(b"\nCELLS 3 8\nOFFSETS vtktypeint64\n");
        bytes.extend(be_bytes(&[0_i64, 4, 8], i64::to_be_bytes));
        bytes.extend_from_slice(b"\nCONNECTIVITY vtktypeint64\n");
        bytes.extend(be_bytes(&[0_i64, 1, 2, 3, 1, 2, 3, 4], i64::to_be_bytes));
        bytes.extend_from_slice(b"\nCELL_TYPES 2\n");
        bytes.extend(be_bytes(&[10_i32, 10], i32::to_be_bytes));
        bytes.push(b'\n');

        let (points, tets) = parse_vtk(&bytes).unwrap();
        assert_eq!((points, tets), parse_vtk(MODERN.as_bytes()).unwrap());
    }

    #[test]
    fn field_data_before_points_is_skipped() {
        let text = CLASSIC.replace(
            "DATASET UNSTRUCTURED_GRID\n",
            "FIELD FieldData 2\nTIME 1 1 double\n0.5\nNULL_ARRAY\nDATASET UNSTRUCTURED_GRID\n\
FIELD FieldData 1\nCYCLE 1 1 int\n3\n",
        );
        assert_eq!(
            parse_vtk(text.as_bytes()).unwrap(),
            parse_vtk(CLASSIC.as_bytes()).unwrap()
        );
    }

    #[test]
    fn absurd_counts_are_errors() {
        let header = "# vtk DataFile Version 3.0\nt\nASCII\nDATASET UNSTRUCTURED_GRID\n";
        for body in [
            "POINTS 6148914691236517206 float\n0 0 0\n",
            "POINTS 1000000000000 double\n0 0 0\n",
            "POINTS 1 float\n0 0 0\nCELLS 4611686018427387904 5\n4 0 0 0 0\n",
            "POINTS 1 float\n0 0 0\nCELLS 1 4611686018427387904\n4 0 0 0 0\n",
            "FIELD f 1\nBIG 4611686018427387904 4 double\n",
        ] {
            let text = format!("{header}{body}");
            assert!(parse_vtk(text.as_bytes()).is_err(), "{body}");
        }

        let mut bytes =
            b"# vtk DataFile Version 3.0\nt\nBINARY\nDATASET UNSTRUCTURED_GRID\nPOINTS 4611686018427387904 double\n"
                .to_vec();
        bytes.extend(be_bytes(&[0.0_f64; 3], f64::to_be_bytes));
        assert!(parse_vtk(&bytes).unwrap_err().contains("truncated binary"));
    }

    #[test]
    fn garbage_is_rejected() {
        let text = CLASSIC.replace("ASCII", "UTF8");
        assert!(parse_vtk(text.as_bytes()).unwrap_err().contains("unknown data format"));
        assert!(parse_vtk(b"solid cube\n").is_err());

        let text = CLASSIC.replace("1 1 1\nCELLS", "1 1\nCELLS");
        assert!(parse_vtk(text.as_bytes()).is_err());

        let text = CLASSIC.replace("POINTS 5 double", "POINTS 5 string");
        assert!(parse_vtk(text.as_bytes()).unwrap_err().contains("unsupported data type"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_vtk("nonexistent_mesh_12345.vtk").unwrap_err();
        assert!(matches!(err, InputError::FileNotFound { .. }));
        assert!(err.to_string().contains("nonexistent_mesh_12345.vtk"));
    }
}
