/// STL file parser for binary and ASCII formats
use nom::{
    bytes::complete::{tag, take},
    character::complete::{multispace0, multispace1, not_line_ending, space0},
    combinator::{all_consuming, opt},
    multi::{count, many0},
    number::complete::{float, le_f32, le_u16, le_u32},
    sequence::{preceded, tuple},
    IResult,
};

use log::debug;

use crate::error::ViewerError;
use crate::geometry::{Mesh, Triangle, Vertex};
use crate::loader::MeshFormat;

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

fn stl_error(reason: impl Into<String>) -> ViewerError {
    ViewerError::parse(MeshFormat::Stl, reason)
}

/// Parse a binary STL file
pub fn parse_binary_stl(data: &[u8]) -> Result<Mesh, ViewerError> {
    if data.len() < HEADER_LEN + 4 {
        return Err(stl_error("file too small to be a valid STL"));
    }

    let (body, _header) = take::<_, _, nom::error::Error<&[u8]>>(HEADER_LEN)(data)
        .map_err(|e| stl_error(format!("{e:?}")))?;
    let (body, triangle_count) = le_u32::<_, nom::error::Error<&[u8]>>(body)
        .map_err(|e| stl_error(format!("{e:?}")))?;
    let triangle_count = triangle_count as usize;

    if body.len() < triangle_count.saturating_mul(FACET_LEN) {
        return Err(stl_error(format!(
            "unexpected end of file: header declares {triangle_count} triangles, {} bytes remain",
            body.len()
        )));
    }

    let (_, triangles) = count(binary_facet, triangle_count)(body)
        .map_err(|e| stl_error(format!("{e:?}")))?;

    let mut mesh = Mesh::with_capacity(triangle_count);
    for triangle in triangles {
        mesh.add_triangle(triangle);
    }
    Ok(mesh)
}

fn binary_vec3(input: &[u8]) -> IResult<&[u8], (f32, f32, f32)> {
    tuple((le_f32, le_f32, le_f32))(input)
}

fn binary_facet(input: &[u8]) -> IResult<&[u8], Triangle> {
    let (input, (nx, ny, nz)) = binary_vec3(input)?;
    let (input, corners) = count(binary_vec3, 3)(input)?;
    // Attribute byte count, unused
    let (input, _) = le_u16(input)?;

    let v = |(x, y, z): (f32, f32, f32)| Vertex::new(x, y, z, nx, ny, nz);
    Ok((
        input,
        Triangle::new(v(corners[0]), v(corners[1]), v(corners[2])),
    ))
}

/// Parse an ASCII STL file
pub fn parse_ascii_stl(input: &str) -> Result<Mesh, ViewerError> {
    match all_consuming(parse_ascii_stl_impl)(input) {
        Ok((_, mesh)) => Ok(mesh),
        Err(e) => Err(stl_error(format!("malformed ASCII STL: {e:?}"))),
    }
}

fn parse_ascii_stl_impl(input: &str) -> IResult<&str, Mesh> {
    let (input, _) = preceded(multispace0, tag("solid"))(input)?;
    let (input, _) = preceded(space0, not_line_ending)(input)?; // Optional name
    let (input, triangles) = many0(parse_facet)(input)?;
    let (input, _) = preceded(multispace0, tag("endsolid"))(input)?;
    let (input, _) = opt(preceded(space0, not_line_ending))(input)?;
    let (input, _) = multispace0(input)?;

    let mut mesh = Mesh::with_capacity(triangles.len());
    for triangle in triangles {
        mesh.add_triangle(triangle);
    }

    Ok((input, mesh))
}

fn parse_facet(input: &str) -> IResult<&str, Triangle> {
    let (input, _) = preceded(multispace0, tag("facet"))(input)?;
    let (input, _) = preceded(multispace1, tag("normal"))(input)?;
    let (input, normal) = parse_vector3(input)?;
    let (input, _) = preceded(multispace0, tag("outer"))(input)?;
    let (input, _) = preceded(multispace1, tag("loop"))(input)?;
    let (input, v1) = parse_vertex(input, normal)?;
    let (input, v2) = parse_vertex(input, normal)?;
    let (input, v3) = parse_vertex(input, normal)?;
    let (input, _) = preceded(multispace0, tag("endloop"))(input)?;
    let (input, _) = preceded(multispace0, tag("endfacet"))(input)?;

    Ok((input, Triangle::new(v1, v2, v3)))
}

fn parse_vertex(input: &str, normal: (f32, f32, f32)) -> IResult<&str, Vertex> {
    let (input, _) = preceded(multispace0, tag("vertex"))(input)?;
    let (input, (x, y, z)) = parse_vector3(input)?;
    Ok((input, Vertex::new(x, y, z, normal.0, normal.1, normal.2)))
}

fn parse_vector3(input: &str) -> IResult<&str, (f32, f32, f32)> {
    let (input, _) = multispace0(input)?;
    let (input, x) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, y) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, z) = float(input)?;
    Ok((input, (x, y, z)))
}

/// Size a binary STL with the count in its header would have
fn declared_binary_len(data: &[u8]) -> Option<usize> {
    if data.len() < HEADER_LEN + 4 {
        return None;
    }
    let n = u32::from_le_bytes([data[80], data[81], data[82], data[83]]) as usize;
    n.checked_mul(FACET_LEN)?.checked_add(HEADER_LEN + 4)
}

/// Detect and parse STL file (binary or ASCII)
///
/// Text is tried when the file starts with `solid`, unless it is exactly the
/// size its binary header declares. Some exporters write `solid` into binary
/// headers and pad the body, so a failed text parse falls back to binary
/// whenever the declared facets fit.
pub fn parse_stl(data: &[u8]) -> Result<Mesh, ViewerError> {
    let starts_with_solid = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map_or(false, |start| data[start..].starts_with(b"solid"));
    let declared = declared_binary_len(data);

    if starts_with_solid && declared != Some(data.len()) {
        let ascii = std::str::from_utf8(data)
            .map_err(|_| stl_error("file starts with 'solid' but is not valid text"))
            .and_then(parse_ascii_stl);
        match ascii {
            Ok(mesh) => return Ok(mesh),
            Err(err) if declared.map_or(true, |len| len > data.len()) => return Err(err),
            Err(err) => debug!("not ASCII STL ({err}), reading as binary"),
        }
    }

    parse_binary_stl(data)
}
