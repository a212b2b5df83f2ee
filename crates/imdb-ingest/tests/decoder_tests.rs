//! Decoder integration tests
//!
//! Covers the dataset schemas against realistic IMDb rows:
//! 1. Header-bound decoding of `title.basics`
//! 2. Positional fallback when no header column is bound
//! 3. Sentinel handling for every field kind
//! 4. Rendering decoded rows back to text

use imdb_ingest::datasets::{Rating, Title, TitleAka};
use imdb_ingest::decode::{
    DecodeError, FieldDeclaration, FieldKind, FieldValue, MappingMode, Row, Schema, TsvDecoder,
};
use std::sync::Arc;

fn titles_decoder() -> TsvDecoder<Title> {
    TsvDecoder::new(Arc::new(Title::schema().unwrap())).with_empty_value("\\N")
}

fn declarations(decls: &[&str]) -> Vec<FieldDeclaration> {
    decls.iter().map(|d| d.parse().unwrap()).collect()
}

#[test]
fn test_carmencita() {
    let input = "tconst\ttitleType\tprimaryTitle\tisAdult\tstartYear\tgenres\n\
                 tt0000001\tshort\tCarmencita\t0\t1894\tDocumentary,Short\n\
                 tt0000002\tshort\tLe clown et ses chiens\t0\t\\N\tAnimation,Short\n";

    let records = titles_decoder().decode(input.as_bytes()).unwrap();
    assert_eq!(records.mapping().mode(), MappingMode::Bound);

    let titles: Vec<Title> = records.collect::<Result<_, _>>().unwrap();
    assert_eq!(titles.len(), 2);

    assert_eq!(
        titles[0],
        Title {
            tconst: "tt0000001".into(),
            title_type: "short".into(),
            primary_title: "Carmencita".into(),
            is_adult: false,
            start_year: 1894,
            genres: vec!["Documentary".into(), "Short".into()],
            ..Title::default()
        }
    );
    assert_eq!(titles[1].start_year, 0);
    assert_eq!(titles[1].primary_title, "Le clown et ses chiens");
}

#[test]
fn test_full_title_basics_header() {
    let input = "tconst\ttitleType\tprimaryTitle\toriginalTitle\tisAdult\tstartYear\tendYear\truntimeMinutes\tgenres\n\
                 tt0944947\ttvSeries\tGame of Thrones\tGame of Thrones\t0\t2011\t2019\t57\tAction,Adventure,Drama\n";

    let title = titles_decoder()
        .decode(input.as_bytes())
        .unwrap()
        .next()
        .unwrap()
        .unwrap();

    assert_eq!(title.title_type, "tvSeries");
    assert_eq!(title.original_title, "Game of Thrones");
    assert_eq!(title.end_year, 2019);
    assert_eq!(title.runtime_minutes, 57);
    assert_eq!(title.genres.len(), 3);
}

#[test]
fn test_akas_header_order_does_not_matter() {
    let decoder = TsvDecoder::new(Arc::new(TitleAka::schema().unwrap())).with_empty_value("\\N");
    let input = "titleId\tordering\ttitle\tregion\tlanguage\ttypes\tattributes\tisOriginalTitle\n\
                 tt0000001\t1\tCarmencita\t\\N\t\\N\toriginal\t\\N\t1\n\
                 tt0000001\t2\tКарменсіта\tUA\t\\N\timdbDisplay\t\\N\t0\n";

    let akas: Vec<TitleAka> = decoder
        .decode(input.as_bytes())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(akas[0].region, "");
    assert!(akas[0].is_original_title);
    assert_eq!(akas[1].title, "Карменсіта");
    assert_eq!(akas[1].region, "UA");
    assert!(!akas[1].is_original_title);
}

#[test]
fn test_positional_fallback_ignores_header_names() {
    let schema = Row::schema(&declarations(&["id:text", "rating:real", "votes:int"])).unwrap();
    let decoder = TsvDecoder::new(Arc::new(schema));

    let records = decoder
        .decode("a\tb\tc\ntt0000001\t5.7\t1989\n".as_bytes())
        .unwrap();
    assert_eq!(records.mapping().mode(), MappingMode::Positional);

    let rows: Vec<Row> = records.collect::<Result<_, _>>().unwrap();
    assert_eq!(
        rows[0].values,
        vec![
            FieldValue::Text("tt0000001".into()),
            FieldValue::Real(5.7),
            FieldValue::Integer(1989),
        ]
    );
}

#[test]
fn test_positional_mode_with_dataset_schema() {
    // A headerless-looking file whose first line names nothing the schema binds
    let decoder = TsvDecoder::new(Arc::new(Rating::schema().unwrap()));
    let input = "id\tavg\tvotes\textra\ntt0000001\t5.7\t1989\tignored\n";

    let ratings: Vec<Rating> = decoder
        .decode(input.as_bytes())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(ratings[0].tconst, "tt0000001");
    assert_eq!(ratings[0].average_rating, 5.7);
    assert_eq!(ratings[0].num_votes, 1989);
}

#[test]
fn test_sentinels_decode_to_zero_values() {
    let decls = declarations(&["t:text", "b:bool", "i:int", "r:real", "l:list"]);
    let decoder = TsvDecoder::new(Arc::new(Row::schema(&decls).unwrap()))
        .with_empty_values(["\\N", "NULL"]);

    let input = "t\tb\ti\tr\tl\n\
                 \\N\t\\N\t\\N\t\\N\t\\N\n\
                 NULL\tNULL\tNULL\tNULL\tNULL\n\
                 \t\t\t\t\n";
    let rows: Vec<Row> = decoder
        .decode(input.as_bytes())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    let zeros: Vec<FieldValue> = [
        FieldKind::Text,
        FieldKind::Boolean,
        FieldKind::Integer,
        FieldKind::Real,
        FieldKind::List,
    ]
    .iter()
    .map(|kind| kind.zero())
    .collect();

    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(row.values, zeros);
    }
}

#[test]
fn test_sentinel_unset_means_only_empty_is_absent() {
    let decls = declarations(&["id:text", "year:int"]);
    let decoder = TsvDecoder::new(Arc::new(Row::schema(&decls).unwrap()));

    let mut records = decoder
        .decode("id\tyear\n\\N\t\n\\N\t\\N\n".as_bytes())
        .unwrap();

    let first = records.next().unwrap().unwrap();
    assert_eq!(
        first.values,
        vec![FieldValue::Text("\\N".into()), FieldValue::Integer(0)]
    );

    let err = records.next().unwrap().unwrap_err();
    assert!(matches!(
        err,
        DecodeError::Malformed {
            line: 3,
            kind: FieldKind::Integer,
            ..
        }
    ));
}

#[test]
fn test_malformed_boolean_reports_field_and_line() {
    let input = "tconst\ttitleType\tisAdult\n\
                 tt0000001\tshort\t0\n\
                 tt0000002\tshort\tmaybe\n";

    let results: Vec<Result<Title, DecodeError>> =
        titles_decoder().decode(input.as_bytes()).unwrap().collect();

    assert!(results[0].is_ok());
    match &results[1] {
        Err(DecodeError::Malformed {
            line,
            field,
            kind,
            value,
            ..
        }) => {
            assert_eq!(*line, 3);
            assert_eq!(field, "is_adult");
            assert_eq!(*kind, FieldKind::Boolean);
            assert_eq!(value, "maybe");
        }
        other => panic!("expected malformed boolean, got {other:?}"),
    }
}

#[test]
fn test_integer_overflow_is_an_error() {
    let input = "tconst\tstartYear\ntt0000001\t99999999999999999999\n";
    let err = titles_decoder()
        .decode(input.as_bytes())
        .unwrap()
        .next()
        .unwrap()
        .unwrap_err();
    assert_eq!(err.line(), Some(2));
}

#[test]
fn test_rendering_round_trips_modulo_coercion() {
    let decls = declarations(&[
        "id:text",
        "adult:bool",
        "season:int",
        "rating:real",
        "genres:list",
    ]);
    let decoder = TsvDecoder::new(Arc::new(Row::schema(&decls).unwrap()));

    let input = "a\tb\tc\td\te\n\
                 tt0000001\t1\t07\t5.5\tDocumentary,Short\n\
                 tt0000002\t0\t12\t8\tDrama\n";
    let lines: Vec<String> = decoder
        .decode(input.as_bytes())
        .unwrap()
        .map(|row| row.unwrap().to_line())
        .collect();

    assert_eq!(lines[0], "tt0000001\t1\t7\t5.5\tDocumentary,Short");
    assert_eq!(lines[1], "tt0000002\t0\t12\t8\tDrama");
}

#[test]
fn test_records_are_lazy() {
    #[derive(Default)]
    struct Id(String);

    let schema = Schema::<Id>::builder()
        .text("id", "tconst", |r, v| r.0 = v)
        .build()
        .unwrap();
    let decoder = TsvDecoder::new(Arc::new(schema));

    let mut input = String::from("tconst\n");
    for i in 0..10_000 {
        input.push_str(&format!("tt{i:07}\n"));
    }

    let first: Vec<String> = decoder
        .decode(input.as_bytes())
        .unwrap()
        .take(3)
        .map(|r| r.unwrap().0)
        .collect();
    assert_eq!(first, vec!["tt0000000", "tt0000001", "tt0000002"]);
}
